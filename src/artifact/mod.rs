//! Artifacts: tarballs in the staging bucket and their ledger records
//!
//! An artifact is identified by its bucket key. Its metadata record lives
//! next to it in the bucket under `<key><suffix>`, and in the ledger under
//! `<stage>/<key><suffix>`.

mod checksum;
mod listing;

pub use checksum::{expected_sha256, sha256_file, verify_tarball, Verification};
pub use listing::list_directories;

use ingest_remote::{ObjectStore, RemoteError};

use crate::stage::Stage;

/// Title prefix of failure reports
pub const FAILURE_TITLE_PREFIX: &str = "Failed to ingest";

/// Tarball identity plus the derived names used across both remotes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Artifact {
    key: String,
    record_key: String,
}

impl Artifact {
    pub fn new(key: impl Into<String>, suffix: &str) -> Self {
        let key = key.into();
        let record_key = format!("{}{}", key, suffix);
        Self { key, record_key }
    }

    /// Bucket key of the tarball
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Bucket key of the metadata record
    pub fn record_key(&self) -> &str {
        &self.record_key
    }

    /// Last path segment of the key
    pub fn filename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Last path segment of the record key
    pub fn record_filename(&self) -> &str {
        self.record_key.rsplit('/').next().unwrap_or(&self.record_key)
    }

    /// Ledger path of the record while the artifact is at `stage`
    pub fn record_path(&self, stage: Stage) -> String {
        format!("{}/{}", stage.as_str(), self.record_key)
    }

    /// Review branch gating the move to `to`
    pub fn gate_branch(&self, to: Stage) -> String {
        format!("{}_{}", self.filename(), to.as_str())
    }

    /// Title of the failure report for this artifact
    pub fn failure_title(&self) -> String {
        format!("{} {}", FAILURE_TITLE_PREFIX, self.key)
    }
}

/// List the artifacts in `bucket`, skipping metadata records.
///
/// Keeps the store's listing order.
pub fn enumerate(
    store: &dyn ObjectStore,
    bucket: &str,
    suffix: &str,
) -> Result<Vec<Artifact>, RemoteError> {
    let keys = store.list(bucket)?;
    let artifacts: Vec<Artifact> = keys
        .into_iter()
        .filter(|k| !k.ends_with(suffix) && !k.ends_with('/'))
        .map(|k| Artifact::new(k, suffix))
        .collect();
    tracing::info!(bucket, count = artifacts.len(), "enumerated artifacts");
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockObjectStore;

    const SUFFIX: &str = ".meta.txt";

    #[test]
    fn test_derived_names() {
        let artifact = Artifact::new("2023.06/software/linux/foo.tar.gz", SUFFIX);
        assert_eq!(artifact.filename(), "foo.tar.gz");
        assert_eq!(artifact.record_key(), "2023.06/software/linux/foo.tar.gz.meta.txt");
        assert_eq!(artifact.record_filename(), "foo.tar.gz.meta.txt");
        assert_eq!(
            artifact.record_path(Stage::Staged),
            "staged/2023.06/software/linux/foo.tar.gz.meta.txt"
        );
        assert_eq!(artifact.gate_branch(Stage::Approved), "foo.tar.gz_approved");
        assert_eq!(
            artifact.failure_title(),
            "Failed to ingest 2023.06/software/linux/foo.tar.gz"
        );
    }

    #[test]
    fn test_flat_key() {
        let artifact = Artifact::new("foo.tar.gz", SUFFIX);
        assert_eq!(artifact.filename(), "foo.tar.gz");
        assert_eq!(artifact.record_path(Stage::Ingested), "ingested/foo.tar.gz.meta.txt");
    }

    #[test]
    fn test_enumerate_skips_records() {
        let store = MockObjectStore::new();
        store.put("staging", "a.tar.gz", b"a".to_vec());
        store.put("staging", "a.tar.gz.meta.txt", b"m".to_vec());
        store.put("staging", "b.tar.gz", b"b".to_vec());
        store.put("other", "c.tar.gz", b"c".to_vec());

        let artifacts = enumerate(&store, "staging", SUFFIX).unwrap();
        let keys: Vec<&str> = artifacts.iter().map(|a| a.key()).collect();
        assert_eq!(keys, vec!["a.tar.gz", "b.tar.gz"]);
    }
}
