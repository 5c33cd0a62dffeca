//! Unified error types for quotesync.
//!
//! Remote-store failures live in the client crate; these cover the local
//! side of the system and the tool surface.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for local storage and tool input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty key).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Unknown category name.
    #[error("INVALID_CATEGORY: {0}")]
    InvalidCategory(String),

    /// Value could not be encoded or decoded as JSON.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// Local-device database operation failed.
    #[error("LOCAL_STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("LOCAL_STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Local-device store rejected or lost a value.
    #[error("LOCAL_STORE_ERROR: {0}")]
    LocalStore(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidCategory(msg) => (-32602, format!("unknown category: {msg}")),
            Error::Serialization(msg) => (-32000, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::LocalStore(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
