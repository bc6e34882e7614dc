//! In-memory git host
//!
//! Each branch holds a full copy of the tree plus the tree it was forked
//! from, so `merge_pull_request` can replay only the branch's own changes
//! onto a base that moved on in the meantime.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use ingest_remote::{
    FileContent, GitHost, Issue, PullRequest, RemoteError, RequestState, StateFilter,
};

use super::failure::{FailureInjector, HostOp};

type Tree = BTreeMap<String, (Vec<u8>, String)>;

#[derive(Debug, Clone, Default)]
struct Branch {
    tip: String,
    files: Tree,
    /// Tree at fork time
    base: Tree,
}

#[derive(Debug, Default)]
struct HostState {
    branches: BTreeMap<String, Branch>,
    pulls: Vec<PullRequest>,
    issues: Vec<Issue>,
    next_revision: u64,
    next_number: u64,
    clock: i64,
    writes: usize,
    failures: FailureInjector,
}

impl HostState {
    fn revision(&mut self) -> String {
        self.next_revision += 1;
        format!("rev-{}", self.next_revision)
    }

    fn number(&mut self) -> u64 {
        self.next_number += 1;
        self.next_number
    }

    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        Utc.timestamp_opt(1_700_000_000 + self.clock, 0)
            .single()
            .unwrap_or_default()
    }

    fn branch_mut(&mut self, name: &str) -> Result<&mut Branch, RemoteError> {
        self.branches
            .get_mut(name)
            .ok_or_else(|| not_found(&format!("branches/{}", name)))
    }
}

#[derive(Debug)]
pub struct MockGitHost {
    main: String,
    state: Mutex<HostState>,
}

impl MockGitHost {
    /// Host with one empty branch named `main`
    pub fn new(main: &str) -> Self {
        let mut state = HostState::default();
        let tip = state.revision();
        state.branches.insert(
            main.to_string(),
            Branch {
                tip,
                ..Branch::default()
            },
        );
        Self {
            main: main.to_string(),
            state: Mutex::new(state),
        }
    }

    /// Make the next `count` calls of `op` fail with a transport error
    pub fn fail_next(&self, op: HostOp, count: u32) {
        self.state.lock().unwrap().failures.inject(op, count);
    }

    /// Write a file without counting it as a mutation
    pub fn seed_file(&self, branch: &str, path: &str, content: &[u8]) {
        let mut state = self.state.lock().unwrap();
        let revision = state.revision();
        let tip = state.revision();
        let branch = state.branches.entry(branch.to_string()).or_default();
        branch.files.insert(path.to_string(), (content.to_vec(), revision));
        branch.tip = tip;
    }

    /// Fork `name` from the main branch without counting it as a mutation
    pub fn seed_branch(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        let files = state
            .branches
            .get(&self.main)
            .map(|b| b.files.clone())
            .unwrap_or_default();
        let tip = state.revision();
        state.branches.insert(
            name.to_string(),
            Branch {
                tip,
                base: files.clone(),
                files,
            },
        );
    }

    pub fn file(&self, branch: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .branches
            .get(branch)
            .and_then(|b| b.files.get(path))
            .map(|(content, _)| content.clone())
    }

    pub fn file_exists(&self, branch: &str, path: &str) -> bool {
        self.file(branch, path).is_some()
    }

    /// Paths of every file on `branch`
    pub fn paths(&self, branch: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .branches
            .get(branch)
            .map(|b| b.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn branches(&self) -> Vec<String> {
        self.state.lock().unwrap().branches.keys().cloned().collect()
    }

    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.state.lock().unwrap().pulls.clone()
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.state.lock().unwrap().issues.clone()
    }

    pub fn open_issues(&self) -> Vec<Issue> {
        self.issues()
            .into_iter()
            .filter(|i| i.state == RequestState::Open)
            .collect()
    }

    pub fn close_issue(&self, number: u64) {
        let mut state = self.state.lock().unwrap();
        if let Some(issue) = state.issues.iter_mut().find(|i| i.number == number) {
            issue.state = RequestState::Closed;
        }
    }

    /// Close a pull request without merging it
    pub fn close_pull_request(&self, number: u64) {
        let mut state = self.state.lock().unwrap();
        if let Some(pr) = state.pulls.iter_mut().find(|p| p.number == number) {
            pr.state = RequestState::Closed;
        }
    }

    /// Merge a pull request: replay the head branch's changes onto the base
    pub fn merge_pull_request(&self, number: u64) {
        let mut state = self.state.lock().unwrap();
        let Some(index) = state.pulls.iter().position(|p| p.number == number) else {
            return;
        };
        let head = state.pulls[index].head.clone();
        let Some(branch) = state.branches.get(&head).cloned() else {
            return;
        };
        let tip = state.revision();
        let main = self.main.clone();
        if let Some(base) = state.branches.get_mut(&main) {
            for path in branch.base.keys() {
                if !branch.files.contains_key(path) {
                    base.files.remove(path);
                }
            }
            for (path, entry) in &branch.files {
                if branch.base.get(path) != Some(entry) {
                    base.files.insert(path.clone(), entry.clone());
                }
            }
            base.tip = tip;
        }
        let pr = &mut state.pulls[index];
        pr.state = RequestState::Closed;
        pr.merged = true;
    }

    /// Number of mutating API calls served
    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes
    }
}

fn not_found(what: &str) -> RemoteError {
    RemoteError::Http {
        status: 404,
        url: format!("mock://{}", what),
        message: "Not Found".to_string(),
    }
}

fn unprocessable(what: &str, message: &str) -> RemoteError {
    RemoteError::Http {
        status: 422,
        url: format!("mock://{}", what),
        message: message.to_string(),
    }
}

impl GitHost for MockGitHost {
    fn read_file(&self, path: &str, branch: &str) -> Result<Option<FileContent>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.failures.check(HostOp::ReadFile)?;
        let branch = state
            .branches
            .get(branch)
            .ok_or_else(|| not_found(&format!("branches/{}", branch)))?;
        Ok(branch.files.get(path).map(|(content, revision)| FileContent {
            content: content.clone(),
            revision: revision.clone(),
        }))
    }

    fn create_file(
        &self,
        path: &str,
        content: &[u8],
        _message: &str,
        branch: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.failures.check(HostOp::CreateFile)?;
        let revision = state.revision();
        let tip = state.revision();
        let target = state.branch_mut(branch)?;
        if target.files.contains_key(path) {
            return Err(unprocessable(path, "sha wasn't supplied"));
        }
        target.files.insert(path.to_string(), (content.to_vec(), revision));
        target.tip = tip;
        state.writes += 1;
        Ok(())
    }

    fn delete_file(
        &self,
        path: &str,
        revision: &str,
        _message: &str,
        branch: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.failures.check(HostOp::DeleteFile)?;
        let tip = state.revision();
        let target = state.branch_mut(branch)?;
        match target.files.get(path) {
            None => return Err(not_found(path)),
            Some((_, current)) if current != revision => {
                return Err(RemoteError::Http {
                    status: 409,
                    url: format!("mock://{}", path),
                    message: "does not match".to_string(),
                })
            }
            Some(_) => {}
        }
        target.files.remove(path);
        target.tip = tip;
        state.writes += 1;
        Ok(())
    }

    fn branch_tip(&self, branch: &str) -> Result<Option<String>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.failures.check(HostOp::BranchTip)?;
        Ok(state.branches.get(branch).map(|b| b.tip.clone()))
    }

    fn list_branches(&self) -> Result<Vec<String>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.failures.check(HostOp::ListBranches)?;
        Ok(state.branches.keys().cloned().collect())
    }

    fn create_branch(&self, name: &str, revision: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.failures.check(HostOp::CreateBranch)?;
        if state.branches.contains_key(name) {
            return Err(unprocessable(name, "Reference already exists"));
        }
        let source = state
            .branches
            .values()
            .find(|b| b.tip == revision)
            .ok_or_else(|| unprocessable(revision, "Object does not exist"))?;
        let files = source.files.clone();
        state.branches.insert(
            name.to_string(),
            Branch {
                tip: revision.to_string(),
                base: files.clone(),
                files,
            },
        );
        state.writes += 1;
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.failures.check(HostOp::DeleteBranch)?;
        if state.branches.remove(name).is_none() {
            return Err(unprocessable(name, "Reference does not exist"));
        }
        state.writes += 1;
        Ok(())
    }

    fn list_pull_requests(
        &self,
        head_branch: &str,
        filter: StateFilter,
    ) -> Result<Vec<PullRequest>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.failures.check(HostOp::ListPullRequests)?;
        let mut pulls: Vec<PullRequest> = state
            .pulls
            .iter()
            .filter(|p| p.head == head_branch && filter.matches(p.state))
            .cloned()
            .collect();
        pulls.sort_by_key(|p| (p.created_at, p.number));
        Ok(pulls)
    }

    fn create_pull_request(
        &self,
        title: &str,
        _body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.failures.check(HostOp::CreatePullRequest)?;
        if !state.branches.contains_key(head) || !state.branches.contains_key(base) {
            return Err(unprocessable(head, "Validation Failed"));
        }
        if state
            .pulls
            .iter()
            .any(|p| p.head == head && p.state == RequestState::Open)
        {
            return Err(unprocessable(head, "A pull request already exists"));
        }
        let pr = PullRequest {
            number: state.number(),
            title: title.to_string(),
            head: head.to_string(),
            state: RequestState::Open,
            merged: false,
            created_at: state.tick(),
        };
        state.pulls.push(pr.clone());
        state.writes += 1;
        Ok(pr)
    }

    fn list_issues(&self, filter: StateFilter) -> Result<Vec<Issue>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.failures.check(HostOp::ListIssues)?;
        Ok(state
            .issues
            .iter()
            .filter(|i| filter.matches(i.state))
            .cloned()
            .collect())
    }

    fn create_issue(&self, title: &str, _body: &str) -> Result<Issue, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.failures.check(HostOp::CreateIssue)?;
        let issue = Issue {
            number: state.number(),
            title: title.to_string(),
            state: RequestState::Open,
        };
        state.issues.push(issue.clone());
        state.writes += 1;
        Ok(issue)
    }
}
