//! Built-in lane defaults (layer 1)

use serde_json::{json, Value};

/// Hardcoded defaults for every configuration value
#[derive(Debug, Clone)]
pub struct BuiltinDefaults {
    pub bucket: String,
    pub metadata_suffix: String,
    pub scratch_dir: String,
    pub store_kind: String,
    pub store_endpoint: String,
    pub github_api_url: String,
    pub main_branch: String,
    pub token_file: String,
    pub ingest_command: Vec<String>,
    /// Ingestion command timeout (default: 3600 = 1 hour)
    pub ingest_timeout_seconds: u64,
    /// Per-request HTTP timeout (default: 60)
    pub http_timeout_seconds: u64,
    /// How long to wait for another run to finish (default: 10)
    pub lock_timeout_seconds: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            bucket: "software-staging".to_string(),
            metadata_suffix: ".meta.txt".to_string(),
            scratch_dir: "/software/tarballs".to_string(),
            store_kind: "s3".to_string(),
            store_endpoint: "https://s3.amazonaws.com".to_string(),
            github_api_url: "https://api.github.com".to_string(),
            main_branch: "main".to_string(),
            token_file: "gh.txt".to_string(),
            ingest_command: vec!["ingest-tarball.sh".to_string()],
            ingest_timeout_seconds: 3600,
            http_timeout_seconds: 60,
            lock_timeout_seconds: 10,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to a JSON value for merging
    pub fn to_value(&self) -> Value {
        json!({
            "bucket": self.bucket,
            "metadata_suffix": self.metadata_suffix,
            "scratch_dir": self.scratch_dir,
            "object_store": {
                "kind": self.store_kind,
                "endpoint": self.store_endpoint,
            },
            "github": {
                "api_url": self.github_api_url,
                "repository": "",
                "main_branch": self.main_branch,
                "token_file": self.token_file,
            },
            "ingest": {
                "command": self.ingest_command,
                "timeout_seconds": self.ingest_timeout_seconds,
            },
            "http_timeout_seconds": self.http_timeout_seconds,
            "lock_timeout_seconds": self.lock_timeout_seconds,
        })
    }
}
