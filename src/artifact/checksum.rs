//! Tarball integrity check against the checksum carried in its record
//!
//! Accepted record forms:
//! - JSON with `payload.sha256sum` or top-level `sha256sum`
//! - text with a `sha256sum: <hex>` / `sha256: <hex>` line (`=` also accepted)
//! - coreutils `sha256sum` output: `<hex>  <filename>`

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Outcome of checking a tarball against its record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Passed { sha256: String },
    /// The record carries no SHA-256 checksum
    MissingChecksum,
    Mismatch { expected: String, actual: String },
}

impl Verification {
    pub fn passed(&self) -> bool {
        matches!(self, Verification::Passed { .. })
    }

    /// One-line description for logs and failure reports
    pub fn describe(&self) -> String {
        match self {
            Verification::Passed { sha256 } => format!("sha256 {} verified", sha256),
            Verification::MissingChecksum => {
                "metadata record does not carry a sha256 checksum".to_string()
            }
            Verification::Mismatch { expected, actual } => {
                format!("sha256 mismatch: record says {}, tarball is {}", expected, actual)
            }
        }
    }
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Extract the expected SHA-256 digest (lowercase hex) from a record
pub fn expected_sha256(record: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(record) {
        let candidate = value
            .pointer("/payload/sha256sum")
            .or_else(|| value.get("sha256sum"))
            .and_then(|v| v.as_str());
        return candidate
            .map(str::trim)
            .filter(|s| is_sha256_hex(s))
            .map(str::to_ascii_lowercase);
    }

    for line in record.lines() {
        let line = line.trim();
        if let Some((key, value)) = line.split_once([':', '=']) {
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            if (key == "sha256sum" || key == "sha256") && is_sha256_hex(value) {
                return Some(value.to_ascii_lowercase());
            }
        }
        if let Some(first) = line.split_whitespace().next() {
            if is_sha256_hex(first) {
                return Some(first.to_ascii_lowercase());
            }
        }
    }
    None
}

/// Stream a file through SHA-256
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Check the tarball at `tarball` against the record at `record`
pub fn verify_tarball(tarball: &Path, record: &Path) -> io::Result<Verification> {
    let record = std::fs::read_to_string(record)?;
    let Some(expected) = expected_sha256(&record) else {
        return Ok(Verification::MissingChecksum);
    };
    let actual = sha256_file(tarball)?;
    if actual == expected {
        Ok(Verification::Passed { sha256: actual })
    } else {
        Ok(Verification::Mismatch { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // sha256("hello")
    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_expected_from_json_payload() {
        let record = format!(
            r#"{{"uploader": {{"username": "bot"}}, "payload": {{"filename": "foo.tar.gz", "sha256sum": "{}"}}}}"#,
            HELLO.to_uppercase()
        );
        assert_eq!(expected_sha256(&record).as_deref(), Some(HELLO));
    }

    #[test]
    fn test_expected_from_key_value_line() {
        let record = format!("uploader: bot\nsha256sum: {}\nsize: 5\n", HELLO);
        assert_eq!(expected_sha256(&record).as_deref(), Some(HELLO));

        let record = format!("sha256={}", HELLO);
        assert_eq!(expected_sha256(&record).as_deref(), Some(HELLO));
    }

    #[test]
    fn test_expected_from_coreutils_line() {
        let record = format!("{}  foo.tar.gz\n", HELLO);
        assert_eq!(expected_sha256(&record).as_deref(), Some(HELLO));
    }

    #[test]
    fn test_expected_missing() {
        assert_eq!(expected_sha256("uploader: bot\nsize: 5\n"), None);
        assert_eq!(expected_sha256(r#"{"payload": {"sha256sum": "short"}}"#), None);
        assert_eq!(expected_sha256(""), None);
    }

    #[test]
    fn test_verify_tarball_outcomes() {
        let dir = TempDir::new().unwrap();
        let tarball = dir.path().join("foo.tar.gz");
        let record = dir.path().join("foo.tar.gz.meta.txt");
        fs::write(&tarball, b"hello").unwrap();

        fs::write(&record, format!("sha256sum: {}", HELLO)).unwrap();
        assert_eq!(
            verify_tarball(&tarball, &record).unwrap(),
            Verification::Passed {
                sha256: HELLO.to_string()
            }
        );

        fs::write(&record, format!("sha256sum: {}", "0".repeat(64))).unwrap();
        let result = verify_tarball(&tarball, &record).unwrap();
        assert!(matches!(result, Verification::Mismatch { ref actual, .. } if actual == HELLO));
        assert!(!result.passed());

        fs::write(&record, "no checksum here").unwrap();
        assert_eq!(
            verify_tarball(&tarball, &record).unwrap(),
            Verification::MissingChecksum
        );
    }
}
