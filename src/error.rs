//! Error taxonomy for the API client.
//!
//! Every failed HTTP exchange is normalized into an [`ApiError`] carrying a
//! classification kind, the original status code when one exists, the
//! server-provided message(s) and an optional wait hint. Callers branch on
//! [`ApiError::kind`] or [`ApiError::is_retryable`] instead of raw status
//! codes.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Classification of a failed API exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401 or 403 - the token is missing, expired or lacks permission.
    Auth,
    /// 404 - the resource does not exist.
    NotFound,
    /// 409 - the request conflicts with server-side state.
    Conflict,
    /// 422 - the server rejected the request payload.
    Validation,
    /// 429 - the server asked us to slow down.
    RateLimit,
    /// 5xx - the server failed.
    ServerFault,
    /// The request never produced a response.
    Network,
    /// The caller cancelled the operation.
    Cancelled,
    /// Any other status the taxonomy does not name.
    Unknown,
}

impl ErrorKind {
    /// Transient kinds may be retried; deterministic ones never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit | ErrorKind::ServerFault | ErrorKind::Network
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Auth => "authentication error",
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation error",
            ErrorKind::RateLimit => "rate limited",
            ErrorKind::ServerFault => "server error",
            ErrorKind::Network => "network error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unexpected error",
        };
        write!(f, "{}", name)
    }
}

/// A classified error from the API client.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    kind: ErrorKind,
    status: Option<u16>,
    message: String,
    retry_after: Option<Duration>,
}

/// The error body shape used by the API: either a map from field name to a
/// list of messages, or a flat list of message objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Fields {
        errors: std::collections::BTreeMap<String, Vec<ErrorEntry>>,
    },
    List {
        errors: Vec<ErrorEntry>,
    },
    Bare {
        message: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorEntry {
    Message { message: String },
    Plain(String),
}

impl ErrorEntry {
    fn message(&self) -> &str {
        match self {
            ErrorEntry::Message { message } => message,
            ErrorEntry::Plain(message) => message,
        }
    }
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Classify a non-success HTTP response.
    ///
    /// The body, when it parses as one of the structured error shapes, is
    /// folded into the display message; otherwise the raw status reason is
    /// used. An unparseable body is not itself an error.
    pub fn classify(status: StatusCode, body: &str, retry_after: Option<Duration>) -> Self {
        let kind = match status.as_u16() {
            401 | 403 => ErrorKind::Auth,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            422 => ErrorKind::Validation,
            429 => ErrorKind::RateLimit,
            500..=599 => ErrorKind::ServerFault,
            _ => ErrorKind::Unknown,
        };

        let message = parse_error_body(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_string()
        });

        Self {
            kind,
            status: Some(status.as_u16()),
            message,
            retry_after,
        }
    }

    /// A transport-level failure that produced no response at all.
    pub fn network(error: reqwest::Error) -> Self {
        Self {
            kind: ErrorKind::Network,
            status: None,
            message: error.to_string(),
            retry_after: None,
        }
    }

    /// The caller's cancellation signal fired.
    pub fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            status: None,
            message: "operation cancelled".to_string(),
            retry_after: None,
        }
    }

    /// A response body that was expected to decode but did not.
    pub fn decode(error: impl std::fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            status: None,
            message: format!("failed to decode response body: {}", error),
            retry_after: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Server-supplied wait hint, from the `Retry-After` header.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Fold a structured error body into a single display string.
fn parse_error_body(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let message = match parsed {
        ErrorBody::Fields { errors } => errors
            .iter()
            .map(|(field, entries)| {
                let messages: Vec<&str> = entries.iter().map(ErrorEntry::message).collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<String>>()
            .join("; "),
        ErrorBody::List { errors } => errors
            .iter()
            .map(ErrorEntry::message)
            .collect::<Vec<&str>>()
            .join("; "),
        ErrorBody::Bare { message } => message,
    };

    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}
