//! Remote collaborators for the ingest lane
//!
//! Defines the two remote systems the lane talks to, at their interface
//! boundary:
//! - `ObjectStore`: the staging bucket the tarballs land in
//! - `GitHost`: the hosted repository whose tree is the stage ledger
//!
//! Absence is always an explicit `None`, never an error. `RemoteError`
//! is reserved for failures that may go away on the next run.

pub mod error;
pub mod github;
pub mod host;
pub mod s3;
pub mod store;

pub use error::RemoteError;
pub use github::GitHubHost;
pub use host::{FileContent, GitHost, Issue, PullRequest, RequestState, StateFilter};
pub use s3::S3Store;
pub use store::{DirStore, ObjectStore};

/// User agent sent with every HTTP request.
pub const USER_AGENT: &str = concat!("ingest-lane/", env!("CARGO_PKG_VERSION"));
