//! Read-path outcome errors.

use thiserror::Error;

use crate::remote::RemoteError;

/// Why a tracked load produced no fresh value.
///
/// Never surfaces past [`StorageClient`](crate::StorageClient): callers get
/// the cached value or their default instead.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The request was superseded by a newer one or explicitly cancelled.
    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl LoadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled)
    }
}
