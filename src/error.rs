//! The single error shape surfaced by every layer of the crate.
//!
//! Transport failures, non-2xx responses and undecodable bodies all end up as an
//! [`ApiError`], so callers only ever branch on its [`ErrorKind`] and status code.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Broad classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response was received (connection refused, DNS failure, reset, ...).
    Network,
    /// The server answered with a non-2xx status.
    Http,
    /// The response claimed to be JSON but could not be decoded.
    Decode,
    /// The request could not be built (bad URL, header or body).
    Request,
}

/// Normalized error for every transport and HTTP failure.
///
/// `message` is always human readable and never empty, so UI code can render it
/// directly. `status` and `body` are kept separately for programmatic branching.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    body: Option<String>,
}

impl ApiError {
    /// A failure where no HTTP response was received.
    pub fn network(detail: impl std::fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Network,
            message: format!("Network error: {detail}"),
            status: None,
            body: None,
        }
    }

    /// A non-2xx response. The message carries the status line and, when present,
    /// the raw body text.
    pub fn http(status: u16, status_text: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        let status_line = if status_text.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status} {status_text}")
        };
        let message = if body.trim().is_empty() {
            status_line
        } else {
            format!("{status_line}: {body}")
        };

        Self {
            kind: ErrorKind::Http,
            message,
            status: Some(status),
            body: Some(body),
        }
    }

    /// A body that could not be decoded into the expected shape.
    pub fn decode(status: Option<u16>, detail: impl std::fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Decode,
            message: format!("Decode error: {detail}"),
            status,
            body: None,
        }
    }

    /// A request that could not be constructed.
    pub fn request(detail: impl std::fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Request,
            message: format!("Invalid request: {detail}"),
            status: None,
            body: None,
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status code, when a response was received.
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Raw response body text of an HTTP error.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Network failures and undecodable bodies are both "no usable response".
    pub const fn is_network(&self) -> bool {
        matches!(self.kind, ErrorKind::Network | ErrorKind::Decode)
    }

    pub const fn is_http(&self) -> bool {
        matches!(self.kind, ErrorKind::Http)
    }

    /// 4xx responses, typically validation failures with a structured body.
    pub fn is_client_error(&self) -> bool {
        self.is_http() && self.status.is_some_and(|s| (400..500).contains(&s))
    }

    pub fn is_server_error(&self) -> bool {
        self.is_http() && self.status.is_some_and(|s| s >= 500)
    }

    /// 401 or 403, e.g. an expired session token.
    pub fn is_unauthorized(&self) -> bool {
        self.is_http() && matches!(self.status, Some(401 | 403))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::request(err)
        } else if err.is_decode() {
            Self::decode(err.status().map(|s| s.as_u16()), err)
        } else {
            Self::network(err)
        }
    }
}
