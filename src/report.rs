//! Failure reports and review-request bodies
//!
//! Reports are issues in the ledger repository. At most one open report per
//! title is filed: before creating, the open issues are listed and compared
//! by exact title. Closing a report makes room for a new one.

use ingest_remote::{GitHost, StateFilter};

use crate::artifact::Artifact;
use crate::error::LaneError;
use crate::ingest::IngestOutcome;

/// Result of a `report` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Filed(u64),
    /// An open report with the same title already exists
    AlreadyOpen(u64),
}

pub struct FailureReporter<'a> {
    host: &'a dyn GitHost,
}

impl<'a> FailureReporter<'a> {
    pub fn new(host: &'a dyn GitHost) -> Self {
        Self { host }
    }

    /// File a report unless an open one with this exact title exists
    pub fn report(&self, title: &str, body: &str) -> Result<ReportOutcome, LaneError> {
        let open = self.host.list_issues(StateFilter::Open)?;
        if let Some(existing) = open.iter().find(|issue| issue.title == title) {
            tracing::info!(title, issue = existing.number, "open report already exists, skipping");
            return Ok(ReportOutcome::AlreadyOpen(existing.number));
        }

        let issue = self.host.create_issue(title, body)?;
        tracing::warn!(title, issue = issue.number, "filed failure report");
        Ok(ReportOutcome::Filed(issue.number))
    }
}

/// Body of the report for a failed ingestion command
pub fn ingestion_failure_body(artifact: &Artifact, outcome: &IngestOutcome) -> String {
    format!(
        "Ingestion for tarball {tarball} has failed.\n\
         \n\
         Ingestion command:\n\
         ```\n\
         {command}\n\
         ```\n\
         \n\
         Return code:\n\
         {return_code}\n\
         \n\
         Stdout:\n\
         ```\n\
         {stdout}\n\
         ```\n\
         \n\
         Stderr:\n\
         ```\n\
         {stderr}\n\
         ```\n",
        tarball = artifact.key(),
        command = outcome.command_line(),
        return_code = outcome.return_code(),
        stdout = outcome.stdout,
        stderr = outcome.stderr,
    )
}

/// Body of the report for a tarball that failed its integrity check
pub fn verification_failure_body(artifact: &Artifact, detail: &str) -> String {
    format!(
        "Ingestion for tarball {tarball} was not attempted: \
         the downloaded tarball did not pass verification.\n\
         \n\
         ```\n\
         {detail}\n\
         ```\n\
         \n\
         The local copy has been discarded and will be fetched again on the next run.\n",
        tarball = artifact.key(),
        detail = detail,
    )
}

/// Body of the pull request asking for approval
pub fn approval_request_body(directories: &[String]) -> String {
    format!(
        "A new tarball has been staged.\n\
         Please review the contents of this tarball carefully.\n\
         Merging this PR will lead to automatic ingestion of the tarball.\n\
         \n\
         <details>\n\
         Directory structure inside the tarball:\n\
         \n\
         ```\n\
         {overview}\n\
         ```\n\
         \n\
         </details>\n",
        overview = directories.join("\n"),
    )
}
