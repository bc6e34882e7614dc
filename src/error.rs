//! Error types for the ingest lane

use std::io;

use ingest_remote::RemoteError;

use crate::config::ConfigError;
use crate::lock::LockError;
use crate::stage::Stage;

/// Errors raised while moving one artifact through the lane.
///
/// None of these are fatal to a run: the engine logs them per artifact
/// and moves on to the next one.
#[derive(Debug, thiserror::Error)]
pub enum LaneError {
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("run lock error: {0}")]
    Lock(#[from] LockError),

    #[error("ledger record {path} not found on branch {branch}")]
    RecordMissing { path: String, branch: String },

    /// The delete half of a relocation succeeded but the create half did not
    #[error("record deleted from {from} but not created at {to} on branch {branch}: {source}")]
    RecordLost {
        from: String,
        to: String,
        branch: String,
        #[source]
        source: RemoteError,
    },

    #[error("main line branch {0} does not exist")]
    MainBranchMissing(String),

    #[error("no transition from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("local copy of {0} is incomplete")]
    DownloadIncomplete(String),

    #[error("cannot read tarball {path}: {message}")]
    Archive { path: String, message: String },
}
