//! Object store interface and a directory-backed implementation

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::RemoteError;

/// Read-only view of an object-storage bucket.
pub trait ObjectStore: Send + Sync {
    /// List every key currently in the bucket
    fn list(&self, bucket: &str) -> Result<Vec<String>, RemoteError>;

    /// Fetch an object. `Ok(None)` means the key does not exist.
    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, RemoteError>;

    /// Fetch an object into `dest`, returning whether the key existed.
    ///
    /// `dest` is only written when the object exists.
    fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<bool, RemoteError> {
        match self.get(bucket, key)? {
            Some(bytes) => {
                fs::write(dest, bytes)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Object store where each bucket is a directory under `root`.
///
/// Keys are the `/`-separated paths of regular files relative to the
/// bucket directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.root.join(bucket);
        for segment in key.split('/').filter(|s| !s.is_empty() && *s != "..") {
            path.push(segment);
        }
        path
    }
}

impl ObjectStore for DirStore {
    fn list(&self, bucket: &str) -> Result<Vec<String>, RemoteError> {
        let bucket_dir = self.root.join(bucket);
        if !bucket_dir.is_dir() {
            return Err(RemoteError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("bucket directory {} does not exist", bucket_dir.display()),
            )));
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&bucket_dir).follow_links(false) {
            let entry = entry.map_err(|e| RemoteError::Io(io::Error::from(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&bucket_dir) else {
                continue;
            };
            let key: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            keys.push(key.join("/"));
        }
        keys.sort();
        Ok(keys)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        match fs::read(self.object_path(bucket, key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RemoteError::Io(e)),
        }
    }

    fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<bool, RemoteError> {
        match fs::copy(self.object_path(bucket, key), dest) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RemoteError::Io(e)),
        }
    }
}
