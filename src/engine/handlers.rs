//! Stage handlers bound in the transition table

use std::fs;

use crate::artifact::{list_directories, verify_tarball};
use crate::error::LaneError;
use crate::gate::{GateManager, GateOutcome};
use crate::report::{
    approval_request_body, ingestion_failure_body, verification_failure_body, FailureReporter,
    ReportOutcome,
};
use crate::stage::Stage;

use super::{ProcessOutcome, Processor};

impl Processor<'_, '_> {
    /// new: copy the bucket record into `staged/` on the main line.
    /// Returns an outcome only when nothing was created.
    pub(super) fn mark_staged(&mut self) -> Result<Option<ProcessOutcome>, LaneError> {
        let local = self.local_copy();
        let Some((_, record)) = local.paths() else {
            tracing::warn!("download incomplete, retrying next run");
            return Ok(Some(skipped("download incomplete")));
        };

        let content = fs::read(record)?;
        let lane = self.lane;
        lane.ledger
            .create(Stage::Staged, self.artifact, &content, lane.ledger.main_branch())?;
        self.stage = Some(Stage::Staged);
        Ok(None)
    }

    /// staged: find or open the approval gate and act on its outcome
    pub(super) fn request_approval(&mut self) -> Result<ProcessOutcome, LaneError> {
        let lane = self.lane;
        let artifact = self.artifact;
        let gates = GateManager::new(&lane.ledger);

        let outcome = match gates.ensure_gate(artifact, Stage::Staged, Stage::Approved, || {
            self.approval_body()
        }) {
            Ok(outcome) => outcome,
            Err(LaneError::DownloadIncomplete(_)) => {
                tracing::warn!("download incomplete, approval request deferred");
                return Ok(skipped("download incomplete"));
            }
            Err(e) => return Err(e),
        };

        match outcome {
            GateOutcome::Pending { pr, opened } => {
                if !opened {
                    tracing::info!(pr, "approval request still open");
                }
                Ok(ProcessOutcome::AwaitingReview { pr, opened })
            }
            GateOutcome::Merged { pr } => {
                let main = lane.ledger.main_branch();
                if lane.ledger.probe(Stage::Approved, artifact, main)?.is_none() {
                    tracing::warn!(pr, "approval merged but record not visible under approved");
                } else {
                    tracing::info!(pr, "approval merged, ingestion follows next run");
                }
                Ok(ProcessOutcome::Approved { pr })
            }
            GateOutcome::Rejected { pr } => {
                tracing::info!(pr, "approval request closed without merging");
                lane.ledger
                    .relocate(artifact, Stage::Staged, Stage::Rejected, lane.ledger.main_branch())?;
                self.stage = Some(Stage::Rejected);
                Ok(ProcessOutcome::Rejected { pr })
            }
        }
    }

    fn approval_body(&mut self) -> Result<String, LaneError> {
        let local = self.local_copy();
        let tarball = local
            .tarball
            .ok_or_else(|| LaneError::DownloadIncomplete(self.artifact.key().to_string()))?;
        let directories = list_directories(&tarball)?;
        Ok(approval_request_body(&directories))
    }

    /// approved: verify, run the ingestion command, then move or report
    pub(super) fn ingest(&mut self) -> Result<ProcessOutcome, LaneError> {
        let lane = self.lane;
        let artifact = self.artifact;
        let local = self.local_copy();
        let Some((tarball, record)) = local.paths() else {
            tracing::warn!("download incomplete, retrying next run");
            return Ok(skipped("download incomplete"));
        };

        let verification = verify_tarball(tarball, record)?;
        if !verification.passed() {
            let detail = verification.describe();
            tracing::error!(detail = %detail, "tarball failed verification, not ingesting");
            lane.scratch.evict(artifact);
            self.local = None;
            let reported = self.report(&verification_failure_body(artifact, &detail))?;
            return Ok(ProcessOutcome::VerificationFailed { reported });
        }

        let outcome = lane.ingest.run(tarball);
        if outcome.success() {
            lane.ledger
                .relocate(artifact, Stage::Approved, Stage::Ingested, lane.ledger.main_branch())?;
            self.stage = Some(Stage::Ingested);
            lane.scratch.evict(artifact);
            self.local = None;
            return Ok(ProcessOutcome::Ingested);
        }

        tracing::error!(
            exit_code = ?outcome.exit_code,
            timed_out = outcome.timed_out,
            "ingestion failed"
        );
        let reported = self.report(&ingestion_failure_body(artifact, &outcome))?;
        Ok(ProcessOutcome::IngestFailed { reported })
    }

    /// File the artifact's failure report; true if a new one was filed
    fn report(&self, body: &str) -> Result<bool, LaneError> {
        let reporter = FailureReporter::new(self.lane.ledger.host());
        let outcome = reporter.report(&self.artifact.failure_title(), body)?;
        Ok(matches!(outcome, ReportOutcome::Filed(_)))
    }
}

fn skipped(reason: &str) -> ProcessOutcome {
    ProcessOutcome::Skipped {
        reason: reason.to_string(),
    }
}
