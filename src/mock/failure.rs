//! Failure injection for the mock host

use std::collections::HashMap;

use ingest_remote::RemoteError;

/// Mock host operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    ReadFile,
    CreateFile,
    DeleteFile,
    BranchTip,
    ListBranches,
    CreateBranch,
    DeleteBranch,
    ListPullRequests,
    CreatePullRequest,
    ListIssues,
    CreateIssue,
}

/// Remaining injected failures per operation
#[derive(Debug, Default)]
pub struct FailureInjector {
    remaining: HashMap<HostOp, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls of `op` fail
    pub fn inject(&mut self, op: HostOp, count: u32) {
        *self.remaining.entry(op).or_insert(0) += count;
    }

    pub fn clear(&mut self) {
        self.remaining.clear();
    }

    /// Consume one injected failure for `op`, if any is left
    pub fn check(&mut self, op: HostOp) -> Result<(), RemoteError> {
        match self.remaining.get_mut(&op) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Err(RemoteError::Transport(format!("injected failure for {:?}", op)))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_counts_down() {
        let mut injector = FailureInjector::new();
        injector.inject(HostOp::CreateFile, 2);

        assert!(injector.check(HostOp::CreateFile).is_err());
        assert!(injector.check(HostOp::ReadFile).is_ok());
        assert!(injector.check(HostOp::CreateFile).is_err());
        assert!(injector.check(HostOp::CreateFile).is_ok());
    }

    #[test]
    fn test_clear() {
        let mut injector = FailureInjector::new();
        injector.inject(HostOp::ListIssues, 5);
        injector.clear();
        assert!(injector.check(HostOp::ListIssues).is_ok());
    }
}
