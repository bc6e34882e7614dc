//! Git hosting interface
//!
//! The subset of a hosted-repository API the lane needs: file contents on
//! a branch, branch refs, pull requests, and issues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::RemoteError;

/// File contents on a branch plus the revision handle needed to delete it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub content: Vec<u8>,
    /// Blob revision of the file (required by `delete_file`)
    pub revision: String,
}

/// Open/closed state shared by pull requests and issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Open,
    Closed,
}

/// Listing filter for pull requests and issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    Open,
    Closed,
    All,
}

impl StateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateFilter::Open => "open",
            StateFilter::Closed => "closed",
            StateFilter::All => "all",
        }
    }

    pub fn matches(&self, state: RequestState) -> bool {
        match self {
            StateFilter::Open => state == RequestState::Open,
            StateFilter::Closed => state == RequestState::Closed,
            StateFilter::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub head: String,
    pub state: RequestState,
    pub merged: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: RequestState,
}

/// Hosted repository operations.
///
/// Every lookup distinguishes "absent" (`Ok(None)` / empty list) from a
/// failed call (`Err`).
pub trait GitHost: Send + Sync {
    /// Read a file on `branch`
    fn read_file(&self, path: &str, branch: &str) -> Result<Option<FileContent>, RemoteError>;

    /// Create a new file on `branch` with a single commit
    fn create_file(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        branch: &str,
    ) -> Result<(), RemoteError>;

    /// Delete a file on `branch`; `revision` comes from `read_file`
    fn delete_file(
        &self,
        path: &str,
        revision: &str,
        message: &str,
        branch: &str,
    ) -> Result<(), RemoteError>;

    /// Commit revision at the tip of `branch`
    fn branch_tip(&self, branch: &str) -> Result<Option<String>, RemoteError>;

    fn list_branches(&self) -> Result<Vec<String>, RemoteError>;

    /// Create `name` pointing at commit `revision`
    fn create_branch(&self, name: &str, revision: &str) -> Result<(), RemoteError>;

    fn delete_branch(&self, name: &str) -> Result<(), RemoteError>;

    /// Pull requests whose head is `head_branch`, oldest first
    fn list_pull_requests(
        &self,
        head_branch: &str,
        state: StateFilter,
    ) -> Result<Vec<PullRequest>, RemoteError>;

    fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, RemoteError>;

    /// Issues (never pull requests) in the given state
    fn list_issues(&self, state: StateFilter) -> Result<Vec<Issue>, RemoteError>;

    fn create_issue(&self, title: &str, body: &str) -> Result<Issue, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_filter_matches() {
        assert!(StateFilter::Open.matches(RequestState::Open));
        assert!(!StateFilter::Open.matches(RequestState::Closed));
        assert!(StateFilter::Closed.matches(RequestState::Closed));
        assert!(StateFilter::All.matches(RequestState::Open));
        assert!(StateFilter::All.matches(RequestState::Closed));
    }

    #[test]
    fn test_request_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RequestState::Closed).unwrap(),
            "\"closed\""
        );
    }
}
