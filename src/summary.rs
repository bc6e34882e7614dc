//! Run summary (run_summary.json)

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::engine::ProcessOutcome;
use crate::error::LaneError;

/// Schema version for run_summary.json
pub const RUN_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for run_summary.json
pub const RUN_SUMMARY_SCHEMA_ID: &str = "ingest-lane/run_summary@1";

/// Per-artifact line of the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactReport {
    pub key: String,
    /// Set when processing finished
    pub outcome: Option<ProcessOutcome>,
    /// Set when processing stopped on an error
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub schema_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub artifacts: Vec<ArtifactReport>,
    /// Outcome label → number of artifacts
    pub counts: BTreeMap<String, usize>,
    /// Artifacts whose processing stopped on an error
    pub errors: usize,
    pub human_summary: String,
}

impl RunSummary {
    pub fn start() -> Self {
        Self {
            schema_version: RUN_SUMMARY_SCHEMA_VERSION,
            schema_id: RUN_SUMMARY_SCHEMA_ID.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            artifacts: Vec::new(),
            counts: BTreeMap::new(),
            errors: 0,
            human_summary: String::new(),
        }
    }

    pub fn record(&mut self, artifact: &Artifact, result: Result<ProcessOutcome, LaneError>) {
        let report = match result {
            Ok(outcome) => {
                *self.counts.entry(outcome.label().to_string()).or_insert(0) += 1;
                ArtifactReport {
                    key: artifact.key().to_string(),
                    outcome: Some(outcome),
                    error: None,
                }
            }
            Err(e) => {
                self.errors += 1;
                ArtifactReport {
                    key: artifact.key().to_string(),
                    outcome: None,
                    error: Some(e.to_string()),
                }
            }
        };
        self.artifacts.push(report);
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self.human_summary = self.generate_human_summary();
        self
    }

    /// Artifacts that failed ingestion or verification, or hit an error
    pub fn failures(&self) -> usize {
        self.errors
            + self
                .artifacts
                .iter()
                .filter(|a| a.outcome.as_ref().is_some_and(ProcessOutcome::is_failure))
                .count()
    }

    fn generate_human_summary(&self) -> String {
        if self.artifacts.is_empty() {
            return "No artifacts in bucket".to_string();
        }
        let mut parts: Vec<String> = self
            .counts
            .iter()
            .map(|(label, count)| format!("{} {}", count, label.replace('_', " ")))
            .collect();
        if self.errors > 0 {
            parts.push(format!("{} error(s)", self.errors));
        }
        format!("Processed {} artifact(s): {}", self.artifacts.len(), parts.join(", "))
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifact(key: &str) -> Artifact {
        Artifact::new(key, ".meta.txt")
    }

    #[test]
    fn test_empty_run() {
        let summary = RunSummary::start().finish();
        assert_eq!(summary.human_summary, "No artifacts in bucket");
        assert_eq!(summary.failures(), 0);
        assert!(summary.duration_ms().is_some());
    }

    #[test]
    fn test_counts_and_failures() {
        let mut summary = RunSummary::start();
        summary.record(&artifact("a"), Ok(ProcessOutcome::AlreadyIngested));
        summary.record(&artifact("b"), Ok(ProcessOutcome::AlreadyIngested));
        summary.record(&artifact("c"), Ok(ProcessOutcome::IngestFailed { reported: true }));
        summary.record(
            &artifact("d"),
            Err(LaneError::MainBranchMissing("main".to_string())),
        );
        let summary = summary.finish();

        assert_eq!(summary.counts["already_ingested"], 2);
        assert_eq!(summary.counts["ingest_failed"], 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.failures(), 2);
        assert_eq!(
            summary.human_summary,
            "Processed 4 artifact(s): 2 already ingested, 1 ingest failed, 1 error(s)"
        );
        assert_eq!(
            summary.artifacts[3].error.as_deref(),
            Some("main line branch main does not exist")
        );
    }

    #[test]
    fn test_write_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/run_summary.json");
        let mut summary = RunSummary::start();
        summary.record(&artifact("a"), Ok(ProcessOutcome::AwaitingReview { pr: 7, opened: true }));
        let summary = summary.finish();

        summary.write_to_file(&path).unwrap();
        let loaded = RunSummary::from_json(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.schema_id, RUN_SUMMARY_SCHEMA_ID);
        assert_eq!(loaded.artifacts, summary.artifacts);
    }
}
