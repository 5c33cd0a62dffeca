//! Remote document store error types.

use std::sync::Arc;

/// Message fragments that mark an otherwise unclassified failure as transient.
const TRANSIENT_PATTERNS: &[&str] = &["unavailable", "deadline", "timeout", "timed out", "network", "connection reset"];

/// Message fragments that mark a failure as backend resource exhaustion.
const EXHAUSTED_PATTERNS: &[&str] =
    &["resource-exhausted", "resource exhausted", "resource_exhausted", "quota", "too many requests"];

/// Errors from a remote document store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// Store is reachable in principle but refused service.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Request did not complete in time.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Backend signalled rate limiting or quota exhaustion.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// HTTP error response not covered by a more specific variant.
    #[error("HTTP error: {status}")]
    Http { status: u16 },

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Document body could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// Anything else, classified by message.
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Unavailable(_) | RemoteError::DeadlineExceeded | RemoteError::Network(_) => true,
            RemoteError::Http { status } => matches!(status, 408 | 500 | 502 | 503 | 504),
            RemoteError::Other(msg) => matches_any(msg, TRANSIENT_PATTERNS),
            RemoteError::ResourceExhausted(_) | RemoteError::Parse(_) => false,
        }
    }

    /// Whether the backend asked us to slow down.
    pub fn is_resource_exhausted(&self) -> bool {
        match self {
            RemoteError::ResourceExhausted(_) => true,
            RemoteError::Http { status } => *status == 429,
            RemoteError::Other(msg) | RemoteError::Unavailable(msg) => matches_any(msg, EXHAUSTED_PATTERNS),
            RemoteError::DeadlineExceeded | RemoteError::Network(_) | RemoteError::Parse(_) => false,
        }
    }
}

fn matches_any(msg: &str, patterns: &[&str]) -> bool {
    let msg = msg.to_lowercase();
    patterns.iter().any(|p| msg.contains(p))
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { RemoteError::DeadlineExceeded } else { RemoteError::Network(Arc::new(err)) }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Parse(err.to_string())
    }
}
