//! Lane configuration
//!
//! Two layers, merged in order:
//! 1. Built-in defaults
//! 2. Config file (`--config`, or `ingest-lane.toml` in the working directory)
//!
//! The merged value is deserialized into `LaneConfig` and validated once at
//! startup; every component receives the resulting object explicitly.

mod defaults;
mod merge;

pub use defaults::BuiltinDefaults;
pub use merge::{deep_merge, merge_layers, toml_to_json};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "ingest-lane.toml";

/// Name of the run lock file inside the scratch directory
pub const LOCK_FILENAME: &str = ".ingest-lane.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// S3-compatible HTTP endpoint
    S3,
    /// Local directory per bucket
    Dir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub kind: StoreKind,
    /// Base URL for `s3`
    pub endpoint: String,
    /// Parent directory of bucket directories for `dir`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub api_url: String,
    /// Ledger repository as `owner/name`
    pub repository: String,
    pub main_branch: String,
    /// File holding the API token
    pub token_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Command prefix; the local tarball path is appended as the last argument
    pub command: Vec<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneConfig {
    pub bucket: String,
    pub metadata_suffix: String,
    /// Local cache for downloaded tarballs and records
    pub scratch_dir: PathBuf,
    pub object_store: ObjectStoreConfig,
    pub github: GitHubConfig,
    pub ingest: IngestConfig,
    pub http_timeout_seconds: u64,
    pub lock_timeout_seconds: u64,
    /// Where to write the JSON run summary, if anywhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_path: Option<PathBuf>,
}

/// A file that contributed to the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSource {
    pub path: String,
    /// SHA-256 of the raw file bytes
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Upper bound for every configured timeout
const MAX_TIMEOUT_SECONDS: u64 = 86400;

impl LaneConfig {
    /// Load and validate the configuration.
    ///
    /// An explicit `path` must exist; without one, `ingest-lane.toml` is used
    /// if present and the built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<ConfigSource>), ConfigError> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
                candidate.exists().then_some(candidate)
            }
        };

        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut source = None;

        if let Some(file) = file {
            let bytes = fs::read(&file)
                .map_err(|e| ConfigError::IoError(format!("{}: {}", file.display(), e)))?;
            let digest = hex::encode(Sha256::digest(&bytes));
            let text = String::from_utf8(bytes)
                .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
            layers.push(parse_toml(&text)?);
            source = Some(ConfigSource {
                path: file.display().to_string(),
                digest,
            });
        }

        let config = Self::from_value(merge_layers(layers))?;
        Ok((config, source))
    }

    /// Build from a TOML document layered over the defaults
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let merged = deep_merge(BuiltinDefaults::default().to_value(), parse_toml(text)?);
        Self::from_value(merged)
    }

    fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: LaneConfig = serde_json::from_value(value)
            .map_err(|e| ConfigError::ParseError(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError("bucket must be set".to_string()));
        }
        if self.metadata_suffix.is_empty() {
            return Err(ConfigError::ValidationError(
                "metadata_suffix must not be empty".to_string(),
            ));
        }
        match self.github.repository.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "github.repository must be owner/name, got {:?}",
                    self.github.repository
                )))
            }
        }
        if self.github.main_branch.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "github.main_branch must not be empty".to_string(),
            ));
        }
        if self.ingest.command.first().map_or(true, |c| c.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "ingest.command must name a program".to_string(),
            ));
        }
        if self.object_store.kind == StoreKind::Dir && self.object_store.root.is_none() {
            return Err(ConfigError::ValidationError(
                "object_store.root is required for kind = \"dir\"".to_string(),
            ));
        }
        for (name, value) in [
            ("ingest.timeout_seconds", self.ingest.timeout_seconds),
            ("http_timeout_seconds", self.http_timeout_seconds),
            ("lock_timeout_seconds", self.lock_timeout_seconds),
        ] {
            if value == 0 || value > MAX_TIMEOUT_SECONDS {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be in (0, {}], got {}",
                    name, MAX_TIMEOUT_SECONDS, value
                )));
            }
        }
        Ok(())
    }

    /// Read the API token from `github.token_file`
    pub fn read_token(&self) -> Result<String, ConfigError> {
        let path = &self.github.token_file;
        let token = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        let token = token.trim();
        if token.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "token file {} is empty",
                path.display()
            )));
        }
        Ok(token.to_string())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn ingest_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest.timeout_seconds)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.scratch_dir.join(LOCK_FILENAME)
    }
}

fn parse_toml(text: &str) -> Result<serde_json::Value, ConfigError> {
    let value: toml::Value = toml::from_str(text)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;
    Ok(toml_to_json(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = "[github]\nrepository = \"org/ledger\"\n";

    #[test]
    fn test_minimal_file_inherits_defaults() {
        let config = LaneConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.github.repository, "org/ledger");
        assert_eq!(config.github.main_branch, "main");
        assert_eq!(config.metadata_suffix, ".meta.txt");
        assert_eq!(config.ingest.command, vec!["ingest-tarball.sh"]);
        assert_eq!(config.object_store.kind, StoreKind::S3);
        assert!(config.summary_path.is_none());
    }

    #[test]
    fn test_defaults_alone_need_a_repository() {
        let err = LaneConfig::from_toml_str("").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("repository")));
    }

    #[test]
    fn test_overrides() {
        let config = LaneConfig::from_toml_str(
            r#"
bucket = "eessi-staging"
scratch_dir = "/tmp/tarballs"
summary_path = "/tmp/summary.json"

[github]
repository = "org/ledger"
main_branch = "trunk"

[ingest]
command = ["sudo", "ingest-tarball.sh"]
timeout_seconds = 120

[object_store]
kind = "dir"
root = "/srv/buckets"
"#,
        )
        .unwrap();
        assert_eq!(config.bucket, "eessi-staging");
        assert_eq!(config.github.main_branch, "trunk");
        assert_eq!(config.ingest.command, vec!["sudo", "ingest-tarball.sh"]);
        assert_eq!(config.ingest_timeout(), Duration::from_secs(120));
        assert_eq!(config.object_store.kind, StoreKind::Dir);
        assert_eq!(config.object_store.root, Some(PathBuf::from("/srv/buckets")));
        assert_eq!(config.lock_path(), PathBuf::from("/tmp/tarballs/.ingest-lane.lock"));
    }

    #[test]
    fn test_validation_failures() {
        for doc in [
            "[github]\nrepository = \"noslash\"\n",
            "[github]\nrepository = \"a/b/c\"\n",
            "http_timeout_seconds = 0\n[github]\nrepository = \"o/r\"\n",
            "lock_timeout_seconds = 100000\n[github]\nrepository = \"o/r\"\n",
            "[github]\nrepository = \"o/r\"\n[ingest]\ncommand = []\n",
            "[github]\nrepository = \"o/r\"\n[object_store]\nkind = \"dir\"\n",
            "metadata_suffix = \"\"\n[github]\nrepository = \"o/r\"\n",
        ] {
            assert!(
                matches!(LaneConfig::from_toml_str(doc), Err(ConfigError::ValidationError(_))),
                "expected validation error for {:?}",
                doc
            );
        }
    }

    #[test]
    fn test_unknown_store_kind_is_parse_error() {
        let err =
            LaneConfig::from_toml_str("[github]\nrepository = \"o/r\"\n[object_store]\nkind = \"ftp\"\n")
                .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_records_digest() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let (config, source) = LaneConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.github.repository, "org/ledger");
        let source = source.unwrap();
        assert_eq!(source.digest.len(), 64);
        assert_eq!(source.digest, hex::encode(Sha256::digest(MINIMAL.as_bytes())));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let err = LaneConfig::load(Some(Path::new("/nonexistent/ingest-lane.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_read_token_trims() {
        let mut token = NamedTempFile::new().unwrap();
        token.write_all(b"  ghp_secret\n").unwrap();

        let mut config = LaneConfig::from_toml_str(MINIMAL).unwrap();
        config.github.token_file = token.path().to_path_buf();
        assert_eq!(config.read_token().unwrap(), "ghp_secret");

        let empty = NamedTempFile::new().unwrap();
        config.github.token_file = empty.path().to_path_buf();
        assert!(matches!(config.read_token(), Err(ConfigError::ValidationError(_))));
    }
}
