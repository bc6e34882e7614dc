//! Local scratch area for downloaded tarballs and records
//!
//! The scratch directory is a cache, never an authority: a local copy is
//! reused when present and may be evicted at any time. Fetches land in a
//! temporary sibling first and are renamed into place, so an interrupted
//! download never leaves a truncated file behind under the final name.

use std::fs;
use std::path::{Path, PathBuf};

use ingest_remote::ObjectStore;

use crate::artifact::Artifact;

/// Local paths of an artifact's files; `None` where the fetch failed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCopy {
    pub tarball: Option<PathBuf>,
    pub record: Option<PathBuf>,
}

impl LocalCopy {
    pub fn is_complete(&self) -> bool {
        self.tarball.is_some() && self.record.is_some()
    }

    /// Both paths, if both fetches succeeded
    pub fn paths(&self) -> Option<(&Path, &Path)> {
        match (&self.tarball, &self.record) {
            (Some(t), Some(r)) => Some((t.as_path(), r.as_path())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tarball_path(&self, artifact: &Artifact) -> PathBuf {
        self.local_path(artifact.key())
    }

    pub fn record_path(&self, artifact: &Artifact) -> PathBuf {
        self.local_path(artifact.record_key())
    }

    /// Local mirror of a bucket key; the full key keeps same-named
    /// tarballs from different directories apart
    fn local_path(&self, key: &str) -> PathBuf {
        let mut path = self.dir.clone();
        for segment in key.split('/').filter(|s| !s.is_empty() && *s != "." && *s != "..") {
            path.push(segment);
        }
        path
    }

    /// Make sure both files of `artifact` exist locally.
    ///
    /// Never fails: problems are logged and show up as `None` paths.
    pub fn ensure_local(
        &self,
        store: &dyn ObjectStore,
        bucket: &str,
        artifact: &Artifact,
    ) -> LocalCopy {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::error!(dir = %self.dir.display(), error = %e, "cannot create scratch directory");
            return LocalCopy::default();
        }

        LocalCopy {
            tarball: self.fetch(store, bucket, artifact.key(), self.tarball_path(artifact)),
            record: self.fetch(store, bucket, artifact.record_key(), self.record_path(artifact)),
        }
    }

    fn fetch(&self, store: &dyn ObjectStore, bucket: &str, key: &str, dest: PathBuf) -> Option<PathBuf> {
        if dest.exists() {
            tracing::debug!(key, path = %dest.display(), "using local copy");
            return Some(dest);
        }

        if let Some(parent) = dest.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::error!(key, dir = %parent.display(), error = %e, "cannot create scratch directory");
                return None;
            }
        }

        let partial = partial_path(&dest);
        match store.download(bucket, key, &partial) {
            Ok(true) => match fs::rename(&partial, &dest) {
                Ok(()) => {
                    tracing::debug!(bucket, key, path = %dest.display(), "downloaded");
                    Some(dest)
                }
                Err(e) => {
                    tracing::error!(key, path = %dest.display(), error = %e, "cannot move download into place");
                    let _ = fs::remove_file(&partial);
                    None
                }
            },
            Ok(false) => {
                tracing::error!(bucket, key, "object not found in bucket");
                None
            }
            Err(e) => {
                tracing::error!(bucket, key, path = %dest.display(), error = %e, "download failed");
                let _ = fs::remove_file(&partial);
                None
            }
        }
    }

    /// Drop local copies so the next run fetches fresh ones
    pub fn evict(&self, artifact: &Artifact) {
        for path in [self.tarball_path(artifact), self.record_path(artifact)] {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "evicted local copy"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot evict local copy"),
            }
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}
