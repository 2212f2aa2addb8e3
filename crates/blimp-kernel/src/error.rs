//! Kernel error types.
//!
//! Domain-level failures surface through [`KernelError`]. Persistence
//! backends report through [`RepositoryError`] so that callers above the
//! repository traits never see backend-specific error types.

/// Unified error type for the Blimp domain core.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- App / capability errors ---------------------------------------------
    /// The string is not a known application identifier.
    #[error("unknown application: {value}")]
    UnknownApp { value: String },

    /// A capability key must name at least one application.
    #[error("capability key must contain at least one application")]
    EmptyCapability,

    // -- Registry errors -----------------------------------------------------
    /// Two handlers were registered for the same capability key.
    #[error("duplicate handler for capability {capability}")]
    DuplicateCapability { capability: String },

    /// The key a handler was registered under differs from the key it serves.
    #[error("handler serves {actual} but was registered under {expected}")]
    CapabilityMismatch { expected: String, actual: String },

    /// A handler declared no operations.
    #[error("handler for {capability} declares no operations")]
    NoOperations { capability: String },

    /// No handler is registered for the capability key.
    #[error("no handler registered for capability {capability}")]
    NoHandler { capability: String },

    /// A keyword predicate could not be compiled.
    #[error("invalid predicate: {reason}")]
    InvalidPredicate { reason: String },

    // -- State machine errors ------------------------------------------------
    /// The requested execution status transition is not allowed.
    #[error("invalid execution transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal kernel error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors reported by repository implementations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A status update lost a compare-and-set: the record was not in the
    /// expected state, or the edge is not part of the state machine.
    #[error("execution {id}: cannot move from {from} to {to}")]
    InvalidTransition { id: String, from: String, to: String },

    /// A stored row violates a domain invariant.
    #[error("corrupt {entity} record {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// The storage backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Convenience alias for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepositoryError>;
