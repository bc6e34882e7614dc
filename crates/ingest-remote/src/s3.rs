//! S3-compatible object store over plain HTTP
//!
//! Talks to a publicly readable bucket using path-style URLs
//! (`<endpoint>/<bucket>/<key>`). Listing uses ListObjectsV2 and follows
//! continuation tokens until the listing is no longer truncated.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex_lite::Regex;
use ureq::http::Response;
use ureq::{Agent, Body};

use crate::error::status_error;
use crate::{ObjectStore, RemoteError, USER_AGENT};

/// Upper bound for objects read fully into memory with `get`
const MAX_OBJECT_BYTES: u64 = 64 * 1024 * 1024;

/// Anonymous S3-compatible HTTP client
pub struct S3Store {
    agent: Agent,
    endpoint: String,
}

impl S3Store {
    /// Create a client for `endpoint` with a bound on every request
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/{}", self.endpoint, bucket)
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key.trim_start_matches('/'))
    }

    fn fetch(&self, url: &str) -> Result<Option<Response<Body>>, RemoteError> {
        let resp = self.agent.get(url).header("User-Agent", USER_AGENT).call()?;
        match resp.status().as_u16() {
            404 => Ok(None),
            200..=299 => Ok(Some(resp)),
            _ => Err(status_error(resp, url)),
        }
    }
}

impl ObjectStore for S3Store {
    fn list(&self, bucket: &str) -> Result<Vec<String>, RemoteError> {
        let url = self.bucket_url(bucket);
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut request = self
                .agent
                .get(&url)
                .header("User-Agent", USER_AGENT)
                .query("list-type", "2");
            if let Some(ref t) = token {
                request = request.query("continuation-token", t);
            }
            let mut resp = request.call()?;
            if !resp.status().is_success() {
                return Err(status_error(resp, &url));
            }
            let xml = resp.body_mut().read_to_string()?;
            let page = parse_list_page(&xml);
            keys.extend(page.keys);

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        tracing::debug!(bucket, count = keys.len(), "listed bucket");
        Ok(keys)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let url = self.object_url(bucket, key);
        match self.fetch(&url)? {
            Some(mut resp) => {
                let bytes = resp
                    .body_mut()
                    .with_config()
                    .limit(MAX_OBJECT_BYTES)
                    .read_to_vec()?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<bool, RemoteError> {
        let url = self.object_url(bucket, key);
        let Some(resp) = self.fetch(&url)? else {
            return Ok(false);
        };
        let mut reader = resp.into_body().into_reader();
        let mut file = File::create(dest)?;
        io::copy(&mut reader, &mut file)?;
        Ok(true)
    }
}

/// One page of a ListObjectsV2 response
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ListPage {
    pub keys: Vec<String>,
    /// Present only when the listing is truncated
    pub next_token: Option<String>,
}

fn key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<Key>([^<]*)</Key>").expect("static regex"))
}

fn truncated_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<IsTruncated>\s*true\s*</IsTruncated>").expect("static regex"))
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<NextContinuationToken>([^<]*)</NextContinuationToken>").expect("static regex")
    })
}

pub(crate) fn parse_list_page(xml: &str) -> ListPage {
    let keys = key_re()
        .captures_iter(xml)
        .map(|c| xml_unescape(&c[1]))
        .collect();

    let next_token = if truncated_re().is_match(xml) {
        token_re().captures(xml).map(|c| xml_unescape(&c[1]))
    } else {
        None
    };

    ListPage { keys, next_token }
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
