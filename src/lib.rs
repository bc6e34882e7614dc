//! Ingest Lane - human-gated staging pipeline for software tarballs
//!
//! Tarballs land in an object-storage bucket, are reviewed through a pull
//! request on a ledger repository, and are then handed to an external
//! ingestion command. An artifact's stage is the ledger directory holding
//! its metadata record; every run re-derives it from there.

pub mod artifact;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod ingest;
pub mod ledger;
pub mod lock;
pub mod mock;
pub mod report;
pub mod scratch;
pub mod stage;
pub mod summary;

pub use artifact::{enumerate, Artifact};
pub use config::{ConfigError, ConfigSource, LaneConfig, StoreKind};
pub use engine::{Lane, ProcessOutcome, Processor};
pub use error::LaneError;
pub use gate::{GateManager, GateOutcome};
pub use ingest::{IngestCommand, IngestOutcome};
pub use ledger::{locations, resolve, Ledger};
pub use lock::{LockError, RunLock};
pub use report::{FailureReporter, ReportOutcome};
pub use scratch::{LocalCopy, Scratch};
pub use stage::Stage;
pub use summary::RunSummary;
