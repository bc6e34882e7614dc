//! Transition engine
//!
//! One `Processor` per artifact per run. It resolves the stage once, then
//! dispatches through `TRANSITIONS`; a handler that moves the record
//! updates the cached stage and, for cascading transitions, the processor
//! runs again with the new stage in the same pass.
//!
//! `Lane` owns the collaborators for a run and drives the processors in
//! listing order, one artifact at a time.

mod handlers;

use serde::{Deserialize, Serialize};

use ingest_remote::{GitHost, ObjectStore};

use crate::artifact::Artifact;
use crate::config::LaneConfig;
use crate::error::LaneError;
use crate::ingest::IngestCommand;
use crate::ledger::{resolve, Ledger};
use crate::scratch::{LocalCopy, Scratch};
use crate::stage::{transition_for, Handler, Stage};
use crate::summary::RunSummary;

/// What one `Processor::run` did to an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Approval gate open; `opened` is true when this run created it
    AwaitingReview { pr: u64, opened: bool },
    /// Gate merged; the next run sees the artifact as approved
    Approved { pr: u64 },
    /// Gate closed without merging, record moved to `rejected/`
    Rejected { pr: u64 },
    Ingested,
    IngestFailed { reported: bool },
    /// Checksum check failed, ingestion not attempted
    VerificationFailed { reported: bool },
    AlreadyIngested,
    AlreadyRejected,
    /// Nothing done this run
    Skipped { reason: String },
}

impl ProcessOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::AwaitingReview { .. } => "awaiting_review",
            ProcessOutcome::Approved { .. } => "approved",
            ProcessOutcome::Rejected { .. } => "rejected",
            ProcessOutcome::Ingested => "ingested",
            ProcessOutcome::IngestFailed { .. } => "ingest_failed",
            ProcessOutcome::VerificationFailed { .. } => "verification_failed",
            ProcessOutcome::AlreadyIngested => "already_ingested",
            ProcessOutcome::AlreadyRejected => "already_rejected",
            ProcessOutcome::Skipped { .. } => "skipped",
        }
    }

    /// Whether this outcome is a failure an operator should look at
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ProcessOutcome::IngestFailed { .. } | ProcessOutcome::VerificationFailed { .. }
        )
    }
}

/// Collaborators and settings shared by every artifact of a run
pub struct Lane<'a> {
    store: &'a dyn ObjectStore,
    ledger: Ledger<'a>,
    scratch: Scratch,
    ingest: IngestCommand,
    bucket: String,
}

impl<'a> Lane<'a> {
    pub fn new(config: &LaneConfig, store: &'a dyn ObjectStore, host: &'a dyn GitHost) -> Self {
        Self {
            store,
            ledger: Ledger::new(host, config.github.main_branch.clone()),
            scratch: Scratch::new(&config.scratch_dir),
            ingest: IngestCommand::new(config.ingest.command.clone(), config.ingest_timeout()),
            bucket: config.bucket.clone(),
        }
    }

    pub fn ledger(&self) -> &Ledger<'a> {
        &self.ledger
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    /// Process a single artifact from its current stage
    pub fn process(&self, artifact: &Artifact) -> Result<ProcessOutcome, LaneError> {
        Processor::new(self, artifact).run()
    }

    /// Process every artifact in order.
    ///
    /// An error on one artifact is logged and recorded; the run moves on.
    pub fn run_all(&self, artifacts: &[Artifact]) -> RunSummary {
        let mut summary = RunSummary::start();

        for artifact in artifacts {
            let span = tracing::info_span!("artifact", key = artifact.key());
            let _entered = span.enter();

            let result = self.process(artifact);
            match &result {
                Ok(outcome) => tracing::info!(outcome = outcome.label(), "artifact processed"),
                Err(e) => tracing::error!(error = %e, "artifact processing failed, continuing"),
            }
            summary.record(artifact, result);
        }

        summary.finish()
    }
}

/// Per-artifact state for one run: the cached stage and local copy
pub struct Processor<'l, 'a> {
    lane: &'l Lane<'a>,
    artifact: &'l Artifact,
    stage: Option<Stage>,
    local: Option<LocalCopy>,
}

impl<'l, 'a> Processor<'l, 'a> {
    pub fn new(lane: &'l Lane<'a>, artifact: &'l Artifact) -> Self {
        Self {
            lane,
            artifact,
            stage: None,
            local: None,
        }
    }

    /// Cached stage, if resolved
    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    pub fn run(&mut self) -> Result<ProcessOutcome, LaneError> {
        let stage = match self.stage {
            Some(stage) => stage,
            None => {
                let stage = resolve(&self.lane.ledger, self.artifact)?;
                if stage == Stage::New {
                    if let Some(outcome) = self.reconcile()? {
                        return Ok(outcome);
                    }
                }
                self.stage = Some(stage);
                stage
            }
        };

        let transition = transition_for(stage);
        tracing::debug!(%stage, handler = ?transition.handler, "dispatching");

        let outcome = match transition.handler {
            Handler::MarkStaged => self.mark_staged()?,
            Handler::RequestApproval => Some(self.request_approval()?),
            Handler::Ingest => Some(self.ingest()?),
            Handler::ReportIngested => {
                tracing::info!("already ingested, nothing to do");
                Some(ProcessOutcome::AlreadyIngested)
            }
            Handler::ReportRejected => {
                tracing::info!("rejected, skipping");
                Some(ProcessOutcome::AlreadyRejected)
            }
        };

        if transition.cascades && transition.next.is_some() && self.stage == transition.next {
            return self.run();
        }
        Ok(outcome.unwrap_or_else(|| ProcessOutcome::Skipped {
            reason: format!("moved to {}, next step runs next time", self.stage.unwrap_or(stage)),
        }))
    }

    /// A record found nowhere normally means a new artifact. If the
    /// approval branch carries this artifact's record, it was staged before
    /// and the record has been lost; staging it again would hide that.
    fn reconcile(&self) -> Result<Option<ProcessOutcome>, LaneError> {
        let ledger = &self.lane.ledger;
        let branch = self.artifact.gate_branch(Stage::Approved);
        let branches = ledger.host().list_branches()?;
        if !branches.iter().any(|b| *b == branch) {
            return Ok(None);
        }

        // Same filename under another key shares the branch name
        let mut holds_record = false;
        for stage in [Stage::Approved, Stage::Staged] {
            if ledger.probe(stage, self.artifact, &branch)?.is_some() {
                holds_record = true;
                break;
            }
        }
        if !holds_record {
            tracing::debug!(branch = %branch, "approval branch belongs to another artifact");
            return Ok(None);
        }

        tracing::error!(
            branch = %branch,
            "record missing from every stage but approval branch holds it; manual reconciliation required"
        );
        Ok(Some(ProcessOutcome::Skipped {
            reason: format!("record lost, approval branch {} holds it", branch),
        }))
    }

    /// Local copy of the artifact, fetched at most once per run
    fn local_copy(&mut self) -> LocalCopy {
        let lane = self.lane;
        let artifact = self.artifact;
        self.local
            .get_or_insert_with(|| lane.scratch.ensure_local(lane.store, &lane.bucket, artifact))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{build_tarball, metadata_record, MockGitHost, MockObjectStore};
    use tempfile::TempDir;

    const BUCKET: &str = "software-staging";
    const KEY: &str = "2023.06/foo.tar.gz";

    fn config(scratch: &TempDir, script: &str) -> LaneConfig {
        let text = format!(
            r#"
            scratch_dir = "{}"
            [github]
            repository = "owner/ledger"
            [ingest]
            command = ["sh", "-c", "{}", "ingest"]
            "#,
            scratch.path().display(),
            script
        );
        LaneConfig::from_toml_str(&text).unwrap()
    }

    fn seeded_store() -> MockObjectStore {
        let store = MockObjectStore::new();
        let tarball = build_tarball(&["foo/", "foo/bin/"], &[("foo/bin/tool", b"#!/bin/sh\n")]);
        store.put(BUCKET, &format!("{}.meta.txt", KEY), metadata_record("foo.tar.gz", &tarball).into_bytes());
        store.put(BUCKET, KEY, tarball);
        store
    }

    fn artifact() -> Artifact {
        Artifact::new(KEY, ".meta.txt")
    }

    #[test]
    fn test_new_cascades_into_gate() {
        let scratch = TempDir::new().unwrap();
        let store = seeded_store();
        let host = MockGitHost::new("main");
        let config = config(&scratch, "exit 0");
        let lane = Lane::new(&config, &store, &host);

        let artifact = artifact();
        let mut processor = Processor::new(&lane, &artifact);
        let outcome = processor.run().unwrap();

        assert!(matches!(outcome, ProcessOutcome::AwaitingReview { opened: true, .. }));
        assert_eq!(processor.stage(), Some(Stage::Staged));
        assert!(host.file_exists("main", "staged/2023.06/foo.tar.gz.meta.txt"));
        assert!(host.file_exists("foo.tar.gz_approved", "approved/2023.06/foo.tar.gz.meta.txt"));
    }

    #[test]
    fn test_staged_record_matches_bucket_record() {
        let scratch = TempDir::new().unwrap();
        let store = seeded_store();
        let host = MockGitHost::new("main");
        let config = config(&scratch, "exit 0");
        let lane = Lane::new(&config, &store, &host);

        lane.process(&artifact()).unwrap();

        let expected = store.get(BUCKET, "2023.06/foo.tar.gz.meta.txt").unwrap().unwrap();
        assert_eq!(host.file("main", "staged/2023.06/foo.tar.gz.meta.txt").unwrap(), expected);
    }

    #[test]
    fn test_download_failure_is_skipped_without_writes() {
        let scratch = TempDir::new().unwrap();
        let store = seeded_store();
        store.fail_key(KEY);
        let host = MockGitHost::new("main");
        let config = config(&scratch, "exit 0");
        let lane = Lane::new(&config, &store, &host);

        let outcome = lane.process(&artifact()).unwrap();
        assert!(matches!(outcome, ProcessOutcome::Skipped { .. }));
        assert_eq!(host.write_count(), 0);
    }

    #[test]
    fn test_lost_record_with_gate_branch_is_not_restaged() {
        let scratch = TempDir::new().unwrap();
        let store = seeded_store();
        let host = MockGitHost::new("main");
        host.seed_branch("foo.tar.gz_approved");
        host.seed_file("foo.tar.gz_approved", "approved/2023.06/foo.tar.gz.meta.txt", b"m");
        let config = config(&scratch, "exit 0");
        let lane = Lane::new(&config, &store, &host);

        let outcome = lane.process(&artifact()).unwrap();
        assert!(matches!(outcome, ProcessOutcome::Skipped { ref reason } if reason.contains("record lost")));
        assert_eq!(host.write_count(), 0);
        assert!(!host.file_exists("main", "staged/2023.06/foo.tar.gz.meta.txt"));
    }

    #[test]
    fn test_same_filename_under_other_key_is_still_new() {
        let scratch = TempDir::new().unwrap();
        let store = MockObjectStore::new();
        for arch in ["x86_64", "aarch64"] {
            let tarball = build_tarball(&["tool/"], &[("tool/bin", arch.as_bytes())]);
            let key = format!("{}/tool.tar.gz", arch);
            store.put(BUCKET, &format!("{}.meta.txt", key), metadata_record("tool.tar.gz", &tarball).into_bytes());
            store.put(BUCKET, &key, tarball);
        }
        let host = MockGitHost::new("main");
        let config = config(&scratch, "exit 0");
        let lane = Lane::new(&config, &store, &host);

        let x86 = Artifact::new("x86_64/tool.tar.gz", ".meta.txt");
        let arm = Artifact::new("aarch64/tool.tar.gz", ".meta.txt");
        lane.process(&x86).unwrap();
        assert!(host.branches().contains(&"tool.tar.gz_approved".to_string()));

        // The shared gate name keeps the second one from opening its own gate,
        // but it is staged rather than reported as lost
        let outcome = lane.process(&arm).unwrap();
        assert!(!matches!(outcome, ProcessOutcome::Skipped { ref reason } if reason.contains("record lost")));
        let staged = host.file("main", "staged/aarch64/tool.tar.gz.meta.txt").unwrap();
        assert_eq!(staged, store.get(BUCKET, "aarch64/tool.tar.gz.meta.txt").unwrap().unwrap());
    }

    #[test]
    fn test_terminal_stages_do_nothing() {
        let scratch = TempDir::new().unwrap();
        let store = seeded_store();
        let host = MockGitHost::new("main");
        host.seed_file("main", "ingested/2023.06/foo.tar.gz.meta.txt", b"m");
        host.seed_file("main", "rejected/bar.tar.gz.meta.txt", b"m");
        let config = config(&scratch, "exit 0");
        let lane = Lane::new(&config, &store, &host);

        assert_eq!(lane.process(&artifact()).unwrap(), ProcessOutcome::AlreadyIngested);
        assert_eq!(
            lane.process(&Artifact::new("bar.tar.gz", ".meta.txt")).unwrap(),
            ProcessOutcome::AlreadyRejected
        );
        assert_eq!(host.write_count(), 0);
        assert_eq!(store.fetch_count(), 0);
    }

    #[test]
    fn test_run_all_continues_after_error() {
        let scratch = TempDir::new().unwrap();
        let store = seeded_store();
        let host = MockGitHost::new("main");
        host.seed_file("main", "rejected/bar.tar.gz.meta.txt", b"m");
        let config = config(&scratch, "exit 0");
        let lane = Lane::new(&config, &store, &host);

        let artifacts = vec![
            Artifact::new("broken.tar.gz", ".meta.txt"),
            Artifact::new("bar.tar.gz", ".meta.txt"),
        ];
        host.fail_next(crate::mock::HostOp::ReadFile, 1);
        let summary = lane.run_all(&artifacts);

        assert_eq!(summary.artifacts.len(), 2);
        assert!(summary.artifacts[0].error.is_some());
        assert_eq!(summary.artifacts[1].outcome, Some(ProcessOutcome::AlreadyRejected));
        assert_eq!(summary.errors, 1);
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let json = serde_json::to_value(ProcessOutcome::AwaitingReview { pr: 3, opened: true }).unwrap();
        assert_eq!(json["outcome"], "awaiting_review");
        assert_eq!(json["pr"], 3);
    }
}
