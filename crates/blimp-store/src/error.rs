//! Error types for the blimp-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`]. At the
//! repository-trait boundary errors are converted into
//! [`RepositoryError`](blimp_kernel::RepositoryError).

use blimp_kernel::RepositoryError;
use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// The requested record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A row could not be mapped back into a domain value.
    #[error("corrupt {entity} row {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// A status update did not match the stored status or the state machine.
    #[error("execution {id}: cannot move from {from} to {to}")]
    InvalidTransition { id: String, from: String, to: String },

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => RepositoryError::NotFound { entity, id },
            StoreError::Corrupt { entity, id, reason } => {
                RepositoryError::Corrupt { entity, id, reason }
            }
            StoreError::InvalidTransition { id, from, to } => {
                RepositoryError::InvalidTransition { id, from, to }
            }
            other => RepositoryError::Backend(other.to_string()),
        }
    }
}
