//! Ledger accessor
//!
//! The ledger is a directory tree in the hosted repository. An artifact's
//! stage is the directory that holds its record:
//!
//! ```text
//! staged/2023.06/foo.tar.gz.meta.txt    → foo.tar.gz is STAGED
//! ```
//!
//! Moving a record is the only transition primitive. The hosting API has
//! no rename, so a move is delete-then-create and is not atomic.

mod resolver;

pub use resolver::{locations, resolve};

use ingest_remote::{FileContent, GitHost};

use crate::artifact::Artifact;
use crate::error::LaneError;
use crate::stage::Stage;

pub struct Ledger<'a> {
    host: &'a dyn GitHost,
    main_branch: String,
}

impl<'a> Ledger<'a> {
    pub fn new(host: &'a dyn GitHost, main_branch: impl Into<String>) -> Self {
        Self {
            host,
            main_branch: main_branch.into(),
        }
    }

    pub fn host(&self) -> &'a dyn GitHost {
        self.host
    }

    pub fn main_branch(&self) -> &str {
        &self.main_branch
    }

    /// The artifact's record under `stage` on `branch`, if present
    pub fn probe(
        &self,
        stage: Stage,
        artifact: &Artifact,
        branch: &str,
    ) -> Result<Option<FileContent>, LaneError> {
        Ok(self.host.read_file(&artifact.record_path(stage), branch)?)
    }

    /// Write the record under `stage` on `branch`
    pub fn create(
        &self,
        stage: Stage,
        artifact: &Artifact,
        content: &[u8],
        branch: &str,
    ) -> Result<(), LaneError> {
        let path = artifact.record_path(stage);
        let message = format!("{} {}", stage_verb(stage), artifact.filename());
        self.host.create_file(&path, content, &message, branch)?;
        tracing::info!(artifact = artifact.key(), %stage, branch, "record created");
        Ok(())
    }

    /// Move the record from `from` to `to` on `branch`.
    ///
    /// A record already at `to` and absent at `from` counts as moved. If the
    /// delete lands and the create does not, the record exists nowhere and
    /// `LaneError::RecordLost` is returned.
    pub fn relocate(
        &self,
        artifact: &Artifact,
        from: Stage,
        to: Stage,
        branch: &str,
    ) -> Result<(), LaneError> {
        if !from.can_transition_to(to) {
            return Err(LaneError::InvalidTransition { from, to });
        }

        let from_path = artifact.record_path(from);
        let to_path = artifact.record_path(to);

        let Some(record) = self.probe(from, artifact, branch)? else {
            if self.probe(to, artifact, branch)?.is_some() {
                tracing::info!(
                    artifact = artifact.key(),
                    %from,
                    %to,
                    branch,
                    "record already relocated"
                );
                return Ok(());
            }
            return Err(LaneError::RecordMissing {
                path: from_path,
                branch: branch.to_string(),
            });
        };

        self.host.delete_file(
            &from_path,
            &record.revision,
            &format!("remove from {}", from),
            branch,
        )?;

        if let Err(source) =
            self.host
                .create_file(&to_path, &record.content, &format!("move to {}", to), branch)
        {
            tracing::error!(
                artifact = artifact.key(),
                from = %from_path,
                to = %to_path,
                branch,
                error = %source,
                "record deleted but not recreated; manual reconciliation required"
            );
            return Err(LaneError::RecordLost {
                from: from_path,
                to: to_path,
                branch: branch.to_string(),
                source,
            });
        }

        tracing::info!(artifact = artifact.key(), %from, %to, branch, "record relocated");
        Ok(())
    }
}

fn stage_verb(stage: Stage) -> &'static str {
    match stage {
        Stage::Staged => "stage",
        Stage::Approved => "approve",
        Stage::Ingested => "ingest",
        Stage::Rejected => "reject",
        Stage::New => "add",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{HostOp, MockGitHost};

    const SUFFIX: &str = ".meta.txt";

    fn artifact() -> Artifact {
        Artifact::new("2023.06/foo.tar.gz", SUFFIX)
    }

    #[test]
    fn test_create_then_probe() {
        let host = MockGitHost::new("main");
        let ledger = Ledger::new(&host, "main");

        ledger.create(Stage::Staged, &artifact(), b"meta", "main").unwrap();

        let record = ledger.probe(Stage::Staged, &artifact(), "main").unwrap().unwrap();
        assert_eq!(record.content, b"meta");
        assert!(ledger.probe(Stage::Approved, &artifact(), "main").unwrap().is_none());
    }

    #[test]
    fn test_relocate_moves_content() {
        let host = MockGitHost::new("main");
        let ledger = Ledger::new(&host, "main");
        ledger.create(Stage::Approved, &artifact(), b"meta", "main").unwrap();

        ledger
            .relocate(&artifact(), Stage::Approved, Stage::Ingested, "main")
            .unwrap();

        assert!(!host.file_exists("main", "approved/2023.06/foo.tar.gz.meta.txt"));
        assert_eq!(
            host.file("main", "ingested/2023.06/foo.tar.gz.meta.txt").unwrap(),
            b"meta"
        );
    }

    #[test]
    fn test_relocate_is_idempotent() {
        let host = MockGitHost::new("main");
        let ledger = Ledger::new(&host, "main");
        ledger.create(Stage::Approved, &artifact(), b"meta", "main").unwrap();
        ledger
            .relocate(&artifact(), Stage::Approved, Stage::Ingested, "main")
            .unwrap();
        let writes = host.write_count();

        ledger
            .relocate(&artifact(), Stage::Approved, Stage::Ingested, "main")
            .unwrap();
        assert_eq!(host.write_count(), writes);
    }

    #[test]
    fn test_relocate_missing_record() {
        let host = MockGitHost::new("main");
        let ledger = Ledger::new(&host, "main");

        let err = ledger
            .relocate(&artifact(), Stage::Approved, Stage::Ingested, "main")
            .unwrap_err();
        assert!(matches!(err, LaneError::RecordMissing { ref path, .. }
            if path == "approved/2023.06/foo.tar.gz.meta.txt"));
    }

    #[test]
    fn test_relocate_rejects_invalid_edge() {
        let host = MockGitHost::new("main");
        let ledger = Ledger::new(&host, "main");
        ledger.create(Stage::Staged, &artifact(), b"meta", "main").unwrap();

        let err = ledger
            .relocate(&artifact(), Stage::Staged, Stage::Ingested, "main")
            .unwrap_err();
        assert!(matches!(err, LaneError::InvalidTransition { .. }));
        assert!(host.file_exists("main", "staged/2023.06/foo.tar.gz.meta.txt"));
    }

    #[test]
    fn test_failed_create_after_delete_is_record_lost() {
        let host = MockGitHost::new("main");
        let ledger = Ledger::new(&host, "main");
        ledger.create(Stage::Staged, &artifact(), b"meta", "main").unwrap();
        host.fail_next(HostOp::CreateFile, 1);

        let err = ledger
            .relocate(&artifact(), Stage::Staged, Stage::Rejected, "main")
            .unwrap_err();
        assert!(matches!(err, LaneError::RecordLost { .. }));
        assert!(locations(&ledger, &artifact()).unwrap().is_empty());
    }
}
