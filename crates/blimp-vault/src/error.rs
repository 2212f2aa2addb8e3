//! Vault error types.

use blimp_kernel::RepositoryError;

/// Unified error type for the credential vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Crypto errors ------------------------------------------------------
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Wrong key, tampered ciphertext, or a row moved to another
    /// `(user_id, app)` slot.
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// The master key is malformed.
    #[error("invalid master key: {reason}")]
    InvalidKey { reason: String },

    // -- Store errors -------------------------------------------------------
    /// Stored plaintext did not decode to a credential for the row's app.
    #[error("corrupt credential for {user_id}/{app}: {reason}")]
    CorruptCredential {
        user_id: String,
        app: String,
        reason: String,
    },

    #[error("migration failed: {reason}")]
    MigrationFailed { reason: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Generic ------------------------------------------------------------
    #[error("internal vault error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;

impl From<tokio::task::JoinError> for VaultError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {err}"))
    }
}

impl From<VaultError> for RepositoryError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::CorruptCredential {
                user_id,
                app,
                reason,
            } => RepositoryError::Corrupt {
                entity: "credential",
                id: format!("{user_id}/{app}"),
                reason,
            },
            other => RepositoryError::Backend(other.to_string()),
        }
    }
}
