//! Intent resolution error types.
//!
//! Every failure of a `resolve` call surfaces as a [`ResolutionError`]. A
//! failed resolution never persists a definition.

use blimp_kernel::{KernelError, RepositoryError};

/// Unified error type for the intent resolver.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    // -- Input errors --------------------------------------------------------
    /// The prompt was empty or whitespace.
    #[error("prompt must not be empty")]
    EmptyPrompt,

    // -- Classifier errors ---------------------------------------------------
    /// The classifier could not be reached or refused the request.
    #[error("classifier unavailable: {reason}")]
    ClassifierUnavailable { reason: String },

    /// The classifier answered, but not with a usable classification.
    #[error("malformed classifier response: {reason}")]
    MalformedResponse { reason: String },

    // -- Upstream crate errors -----------------------------------------------
    /// Loading candidates or persisting the new definition failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// An error propagated from the kernel crate.
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal resolver error: {0}")]
    Internal(String),
}

impl ResolutionError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "empty_prompt",
            Self::ClassifierUnavailable { .. } => "classifier_unavailable",
            Self::MalformedResponse { .. } => "malformed_classification",
            Self::Repository(_) => "repository",
            Self::Kernel(_) => "kernel",
            Self::Internal(_) => "internal",
        }
    }
}

/// Convenience alias used throughout the intent crate.
pub type Result<T> = std::result::Result<T, ResolutionError>;
