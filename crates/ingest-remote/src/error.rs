//! Error types for remote calls.

use std::io;

use ureq::http::Response;
use ureq::Body;

/// Failure talking to a remote system.
///
/// "Not found" is not represented here: lookups return `Option` instead.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP {status} from {url}: {message}")]
    Http {
        status: u16,
        url: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<ureq::Error> for RemoteError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(status) => RemoteError::Http {
                status,
                url: String::new(),
                message: "unexpected status".to_string(),
            },
            ureq::Error::Io(e) => RemoteError::Io(e),
            other => RemoteError::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Decode(err.to_string())
    }
}

/// Build an `Http` error from a non-success response, keeping a short
/// prefix of the body as the message
pub(crate) fn status_error(mut resp: Response<Body>, url: &str) -> RemoteError {
    let status = resp.status().as_u16();
    let message = resp
        .body_mut()
        .with_config()
        .limit(4096)
        .read_to_string()
        .unwrap_or_default();
    RemoteError::Http {
        status,
        url: url.to_string(),
        message: message.trim().to_string(),
    }
}
