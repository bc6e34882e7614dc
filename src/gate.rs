//! Approval gate manager
//!
//! A gate is a review branch plus the pull request opened from it. The
//! branch is named `<filename>_<to_stage>` so that a later run finds the
//! gate a previous run created instead of opening a second one. On the
//! branch, the record is moved from `from` to `to`; merging the pull
//! request is therefore what moves the record on the main line.
//!
//! Gate states, as seen from the branch and its pull requests:
//! - no branch: create branch, move record, open pull request → PENDING
//! - branch, no pull request: orphan from an interrupted run; delete the
//!   branch and create the gate again
//! - open pull request → PENDING
//! - closed and merged → MERGED
//! - closed, not merged → REJECTED

use ingest_remote::{GitHost, PullRequest, RequestState, StateFilter};

use crate::artifact::Artifact;
use crate::error::LaneError;
use crate::ledger::Ledger;
use crate::stage::Stage;

/// Terminal or pending outcome of a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Waiting for a reviewer; `opened` is true when this call created it
    Pending { pr: u64, opened: bool },
    Merged { pr: u64 },
    /// Closed without merging
    Rejected { pr: u64 },
}

impl GateOutcome {
    pub fn pr(&self) -> u64 {
        match self {
            GateOutcome::Pending { pr, .. }
            | GateOutcome::Merged { pr }
            | GateOutcome::Rejected { pr } => *pr,
        }
    }
}

pub struct GateManager<'l, 'a> {
    ledger: &'l Ledger<'a>,
}

impl<'l, 'a> GateManager<'l, 'a> {
    pub fn new(ledger: &'l Ledger<'a>) -> Self {
        Self { ledger }
    }

    fn host(&self) -> &'a dyn GitHost {
        self.ledger.host()
    }

    /// Find or create the gate for moving `artifact` from `from` to `to`.
    ///
    /// `describe` renders the pull request body; it is only called when a
    /// gate has to be created, before any remote mutation.
    pub fn ensure_gate<F>(
        &self,
        artifact: &Artifact,
        from: Stage,
        to: Stage,
        describe: F,
    ) -> Result<GateOutcome, LaneError>
    where
        F: FnOnce() -> Result<String, LaneError>,
    {
        let branch = artifact.gate_branch(to);

        if self.branch_exists(&branch)? {
            tracing::debug!(artifact = artifact.key(), branch = %branch, "gate branch exists");
            match self.inspect(artifact, &branch)? {
                Some(outcome) => return Ok(outcome),
                None => {
                    tracing::warn!(
                        artifact = artifact.key(),
                        branch = %branch,
                        "gate branch has no pull request, removing it and reopening the gate"
                    );
                    self.host().delete_branch(&branch)?;
                }
            }
        }

        self.open(artifact, from, to, &branch, describe)
    }

    fn branch_exists(&self, branch: &str) -> Result<bool, LaneError> {
        Ok(self.host().list_branches()?.iter().any(|b| b == branch))
    }

    /// Outcome of the existing gate on `branch`, or `None` if it has no pull request
    fn inspect(&self, artifact: &Artifact, branch: &str) -> Result<Option<GateOutcome>, LaneError> {
        let pulls = self.host().list_pull_requests(branch, StateFilter::All)?;
        let Some(pr) = earliest(&pulls) else {
            return Ok(None);
        };

        if pulls.len() > 1 {
            tracing::warn!(
                artifact = artifact.key(),
                branch,
                count = pulls.len(),
                pr = pr.number,
                "multiple pull requests for one gate, using the earliest"
            );
        }

        let outcome = match (pr.state, pr.merged) {
            (RequestState::Open, _) => GateOutcome::Pending {
                pr: pr.number,
                opened: false,
            },
            (RequestState::Closed, true) => GateOutcome::Merged { pr: pr.number },
            (RequestState::Closed, false) => GateOutcome::Rejected { pr: pr.number },
        };
        tracing::debug!(artifact = artifact.key(), branch, pr = pr.number, ?outcome, "gate inspected");
        Ok(Some(outcome))
    }

    fn open<F>(
        &self,
        artifact: &Artifact,
        from: Stage,
        to: Stage,
        branch: &str,
        describe: F,
    ) -> Result<GateOutcome, LaneError>
    where
        F: FnOnce() -> Result<String, LaneError>,
    {
        let body = describe()?;
        let main = self.ledger.main_branch();
        let tip = self
            .host()
            .branch_tip(main)?
            .ok_or_else(|| LaneError::MainBranchMissing(main.to_string()))?;

        self.host().create_branch(branch, &tip)?;
        self.ledger.relocate(artifact, from, to, branch)?;
        let pr = self.host().create_pull_request(
            &format!("Ingest {}", artifact.filename()),
            &body,
            branch,
            main,
        )?;

        tracing::info!(artifact = artifact.key(), branch, pr = pr.number, "opened approval request");
        Ok(GateOutcome::Pending {
            pr: pr.number,
            opened: true,
        })
    }
}

fn earliest(pulls: &[PullRequest]) -> Option<&PullRequest> {
    pulls.iter().min_by_key(|pr| (pr.created_at, pr.number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{HostOp, MockGitHost};

    fn artifact() -> Artifact {
        Artifact::new("2023.06/foo.tar.gz", ".meta.txt")
    }

    fn staged_host() -> MockGitHost {
        let host = MockGitHost::new("main");
        host.seed_file("main", "staged/2023.06/foo.tar.gz.meta.txt", b"meta");
        host
    }

    fn describe() -> Result<String, LaneError> {
        Ok("body".to_string())
    }

    #[test]
    fn test_first_call_opens_gate() {
        let host = staged_host();
        let ledger = Ledger::new(&host, "main");
        let gates = GateManager::new(&ledger);

        let outcome = gates
            .ensure_gate(&artifact(), Stage::Staged, Stage::Approved, describe)
            .unwrap();
        assert!(matches!(outcome, GateOutcome::Pending { opened: true, .. }));

        // Record moved on the branch only
        assert!(host.file_exists("foo.tar.gz_approved", "approved/2023.06/foo.tar.gz.meta.txt"));
        assert!(!host.file_exists("foo.tar.gz_approved", "staged/2023.06/foo.tar.gz.meta.txt"));
        assert!(host.file_exists("main", "staged/2023.06/foo.tar.gz.meta.txt"));
        assert!(!host.file_exists("main", "approved/2023.06/foo.tar.gz.meta.txt"));

        let pulls = host.pull_requests();
        assert_eq!(pulls.len(), 1);
        assert_eq!(pulls[0].title, "Ingest foo.tar.gz");
        assert_eq!(pulls[0].head, "foo.tar.gz_approved");
    }

    #[test]
    fn test_second_call_reuses_gate() {
        let host = staged_host();
        let ledger = Ledger::new(&host, "main");
        let gates = GateManager::new(&ledger);

        let first = gates
            .ensure_gate(&artifact(), Stage::Staged, Stage::Approved, describe)
            .unwrap();
        let writes = host.write_count();
        let second = gates
            .ensure_gate(&artifact(), Stage::Staged, Stage::Approved, || {
                panic!("describe must not run for an existing gate")
            })
            .unwrap();

        assert_eq!(second, GateOutcome::Pending { pr: first.pr(), opened: false });
        assert_eq!(host.write_count(), writes);
        assert_eq!(host.pull_requests().len(), 1);
        assert_eq!(
            host.branches().iter().filter(|b| *b == "foo.tar.gz_approved").count(),
            1
        );
    }

    #[test]
    fn test_merged_and_rejected_outcomes() {
        let host = staged_host();
        let ledger = Ledger::new(&host, "main");
        let gates = GateManager::new(&ledger);
        let pr = gates
            .ensure_gate(&artifact(), Stage::Staged, Stage::Approved, describe)
            .unwrap()
            .pr();

        host.close_pull_request(pr);
        assert_eq!(
            gates
                .ensure_gate(&artifact(), Stage::Staged, Stage::Approved, describe)
                .unwrap(),
            GateOutcome::Rejected { pr }
        );

        let other = Artifact::new("bar.tar.gz", ".meta.txt");
        host.seed_file("main", "staged/bar.tar.gz.meta.txt", b"meta");
        let pr = gates
            .ensure_gate(&other, Stage::Staged, Stage::Approved, describe)
            .unwrap()
            .pr();
        host.merge_pull_request(pr);
        assert_eq!(
            gates
                .ensure_gate(&other, Stage::Staged, Stage::Approved, describe)
                .unwrap(),
            GateOutcome::Merged { pr }
        );
        assert!(host.file_exists("main", "approved/bar.tar.gz.meta.txt"));
        assert!(!host.file_exists("main", "staged/bar.tar.gz.meta.txt"));
    }

    #[test]
    fn test_orphaned_branch_is_replaced() {
        let host = staged_host();
        host.seed_branch("foo.tar.gz_approved");
        let ledger = Ledger::new(&host, "main");
        let gates = GateManager::new(&ledger);

        let outcome = gates
            .ensure_gate(&artifact(), Stage::Staged, Stage::Approved, describe)
            .unwrap();
        assert!(matches!(outcome, GateOutcome::Pending { opened: true, .. }));
        assert_eq!(host.pull_requests().len(), 1);
        assert!(host.file_exists("foo.tar.gz_approved", "approved/2023.06/foo.tar.gz.meta.txt"));
    }

    #[test]
    fn test_crash_before_pull_request_heals_on_next_call() {
        let host = staged_host();
        let ledger = Ledger::new(&host, "main");
        let gates = GateManager::new(&ledger);

        host.fail_next(HostOp::CreatePullRequest, 1);
        assert!(gates
            .ensure_gate(&artifact(), Stage::Staged, Stage::Approved, describe)
            .is_err());
        assert!(host.branches().contains(&"foo.tar.gz_approved".to_string()));
        assert!(host.pull_requests().is_empty());

        let outcome = gates
            .ensure_gate(&artifact(), Stage::Staged, Stage::Approved, describe)
            .unwrap();
        assert!(matches!(outcome, GateOutcome::Pending { opened: true, .. }));
        assert_eq!(host.pull_requests().len(), 1);
    }

    #[test]
    fn test_multiple_pull_requests_use_earliest() {
        let host = staged_host();
        let ledger = Ledger::new(&host, "main");
        let gates = GateManager::new(&ledger);
        let first = gates
            .ensure_gate(&artifact(), Stage::Staged, Stage::Approved, describe)
            .unwrap()
            .pr();
        host.close_pull_request(first);
        host.create_pull_request("Ingest foo.tar.gz", "dup", "foo.tar.gz_approved", "main")
            .unwrap();

        // The later, still open request does not override the earliest one
        assert_eq!(
            gates
                .ensure_gate(&artifact(), Stage::Staged, Stage::Approved, describe)
                .unwrap(),
            GateOutcome::Rejected { pr: first }
        );
    }

    #[test]
    fn test_describe_failure_leaves_no_gate() {
        let host = staged_host();
        let ledger = Ledger::new(&host, "main");
        let gates = GateManager::new(&ledger);

        let result = gates.ensure_gate(&artifact(), Stage::Staged, Stage::Approved, || {
            Err(LaneError::Archive {
                path: "foo.tar.gz".to_string(),
                message: "truncated".to_string(),
            })
        });
        assert!(result.is_err());
        assert!(host.branches().iter().all(|b| b == "main"));
        assert_eq!(host.write_count(), 0);
    }
}
