//! GitHub REST client for the ledger repository
//!
//! Implements `GitHost` against the v3 REST API:
//! - contents API for reading, creating and deleting ledger records
//! - git refs API for review branches
//! - pulls and issues APIs for approval gates and failure reports
//!
//! Listings are paginated with `per_page`/`page` until a short page.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use ureq::http::Response;
use ureq::{Agent, Body, RequestBuilder};

use crate::error::status_error;
use crate::host::{FileContent, GitHost, Issue, PullRequest, RequestState, StateFilter};
use crate::{RemoteError, USER_AGENT};

const PER_PAGE: usize = 100;

/// Pagination stops after this many pages even if pages stay full
const MAX_PAGES: usize = 50;

pub struct GitHubHost {
    agent: Agent,
    api_url: String,
    owner: String,
    name: String,
    token: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Deserialize)]
struct BranchResponse {
    name: String,
    commit: CommitRef,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Deserialize)]
struct HeadRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    state: RequestState,
    merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    merged: Option<bool>,
    created_at: DateTime<Utc>,
    head: HeadRef,
}

impl From<PullResponse> for PullRequest {
    fn from(pr: PullResponse) -> Self {
        PullRequest {
            number: pr.number,
            title: pr.title,
            head: pr.head.name,
            state: pr.state,
            merged: pr.merged.unwrap_or(pr.merged_at.is_some()),
            created_at: pr.created_at,
        }
    }
}

#[derive(Deserialize)]
struct IssueResponse {
    number: u64,
    title: String,
    state: RequestState,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl GitHubHost {
    /// Create a client for `repository` (`owner/name`).
    pub fn new(
        api_url: impl Into<String>,
        repository: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let (owner, name) = repository
            .split_once('/')
            .filter(|(o, n)| !o.is_empty() && !n.is_empty() && !n.contains('/'))
            .ok_or_else(|| {
                RemoteError::Decode(format!("repository must be owner/name, got {:?}", repository))
            })?;

        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            agent,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            token: token.into(),
        })
    }

    fn repo_url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, self.owner, self.name, tail)
    }

    fn authorize<B>(&self, request: RequestBuilder<B>) -> RequestBuilder<B> {
        request
            .header("Authorization", &format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", USER_AGENT)
    }

    /// Fetch every page of a listing endpoint
    fn paginate<T: DeserializeOwned>(
        &self,
        tail: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, RemoteError> {
        let url = self.repo_url(tail);
        let per_page = PER_PAGE.to_string();
        let mut items = Vec::new();

        for page in 1..=MAX_PAGES {
            let page_str = page.to_string();
            let mut request = self
                .authorize(self.agent.get(&url))
                .query("per_page", &per_page)
                .query("page", &page_str);
            for (k, v) in params {
                request = request.query(*k, *v);
            }
            let resp = expect_success(request.call()?, &url)?;
            let batch: Vec<T> = read_json(resp)?;
            let len = batch.len();
            items.extend(batch);
            if len < PER_PAGE {
                break;
            }
        }

        Ok(items)
    }
}

fn expect_success(resp: Response<Body>, url: &str) -> Result<Response<Body>, RemoteError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(status_error(resp, url))
    }
}

fn read_json<T: DeserializeOwned>(mut resp: Response<Body>) -> Result<T, RemoteError> {
    let text = resp.body_mut().read_to_string()?;
    Ok(serde_json::from_str(&text)?)
}

/// Decode the base64 payload of a contents response (GitHub wraps it at 60 columns)
fn decode_content(contents: &ContentsResponse) -> Result<Vec<u8>, RemoteError> {
    if contents.encoding != "base64" {
        return Err(RemoteError::Decode(format!(
            "unsupported content encoding {:?}",
            contents.encoding
        )));
    }
    let cleaned: String = contents
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    BASE64
        .decode(cleaned)
        .map_err(|e| RemoteError::Decode(format!("invalid base64 content: {}", e)))
}

impl GitHost for GitHubHost {
    fn read_file(&self, path: &str, branch: &str) -> Result<Option<FileContent>, RemoteError> {
        let url = self.repo_url(&format!("contents/{}", path));
        let resp = self
            .authorize(self.agent.get(&url))
            .query("ref", branch)
            .call()?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        let contents: ContentsResponse = read_json(expect_success(resp, &url)?)?;
        let content = decode_content(&contents)?;
        Ok(Some(FileContent {
            content,
            revision: contents.sha,
        }))
    }

    fn create_file(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        branch: &str,
    ) -> Result<(), RemoteError> {
        let url = self.repo_url(&format!("contents/{}", path));
        let body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": branch,
        });
        let resp = self.authorize(self.agent.put(&url)).send_json(&body)?;
        expect_success(resp, &url)?;
        tracing::debug!(path, branch, "created file");
        Ok(())
    }

    fn delete_file(
        &self,
        path: &str,
        revision: &str,
        message: &str,
        branch: &str,
    ) -> Result<(), RemoteError> {
        let url = self.repo_url(&format!("contents/{}", path));
        let body = json!({
            "message": message,
            "sha": revision,
            "branch": branch,
        });
        let resp = self
            .authorize(self.agent.delete(&url))
            .force_send_body()
            .send_json(&body)?;
        expect_success(resp, &url)?;
        tracing::debug!(path, branch, "deleted file");
        Ok(())
    }

    fn branch_tip(&self, branch: &str) -> Result<Option<String>, RemoteError> {
        let url = self.repo_url(&format!("branches/{}", branch));
        let resp = self.authorize(self.agent.get(&url)).call()?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        let branch: BranchResponse = read_json(expect_success(resp, &url)?)?;
        Ok(Some(branch.commit.sha))
    }

    fn list_branches(&self) -> Result<Vec<String>, RemoteError> {
        let branches: Vec<BranchResponse> = self.paginate("branches", &[])?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    fn create_branch(&self, name: &str, revision: &str) -> Result<(), RemoteError> {
        let url = self.repo_url("git/refs");
        let body = json!({
            "ref": format!("refs/heads/{}", name),
            "sha": revision,
        });
        let resp = self.authorize(self.agent.post(&url)).send_json(&body)?;
        expect_success(resp, &url)?;
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<(), RemoteError> {
        let url = self.repo_url(&format!("git/refs/heads/{}", name));
        let resp = self.authorize(self.agent.delete(&url)).call()?;
        expect_success(resp, &url)?;
        Ok(())
    }

    fn list_pull_requests(
        &self,
        head_branch: &str,
        state: StateFilter,
    ) -> Result<Vec<PullRequest>, RemoteError> {
        let head = format!("{}:{}", self.owner, head_branch);
        let pulls: Vec<PullResponse> =
            self.paginate("pulls", &[("head", &head), ("state", state.as_str())])?;
        let mut pulls: Vec<PullRequest> = pulls.into_iter().map(PullRequest::from).collect();
        pulls.sort_by(|a, b| (a.created_at, a.number).cmp(&(b.created_at, b.number)));
        Ok(pulls)
    }

    fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, RemoteError> {
        let url = self.repo_url("pulls");
        let payload = json!({
            "title": title,
            "body": body,
            "head": head,
            "base": base,
        });
        let resp = self.authorize(self.agent.post(&url)).send_json(&payload)?;
        let pr: PullResponse = read_json(expect_success(resp, &url)?)?;
        Ok(pr.into())
    }

    fn list_issues(&self, state: StateFilter) -> Result<Vec<Issue>, RemoteError> {
        let issues: Vec<IssueResponse> = self.paginate("issues", &[("state", state.as_str())])?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(|i| Issue {
                number: i.number,
                title: i.title,
                state: i.state,
            })
            .collect())
    }

    fn create_issue(&self, title: &str, body: &str) -> Result<Issue, RemoteError> {
        let url = self.repo_url("issues");
        let payload = json!({ "title": title, "body": body });
        let resp = self.authorize(self.agent.post(&url)).send_json(&payload)?;
        let issue: IssueResponse = read_json(expect_success(resp, &url)?)?;
        Ok(Issue {
            number: issue.number,
            title: issue.title,
            state: issue.state,
        })
    }
}
