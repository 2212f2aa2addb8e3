//! Engine error types.
//!
//! [`EngineError`] covers both outcomes a caller sees as `Err` (resolution
//! failures, unknown workflows, storage faults) and execution failures that
//! are recorded on the execution record. The latter render to a structured
//! detail object through [`EngineError::detail`].

use blimp_intent::ResolutionError;
use blimp_kernel::{AppId, HandlerError, RepositoryError};
use serde_json::{Value, json};

/// Unified error type for the Blimp engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // -- Pre-execution errors ------------------------------------------------
    /// The prompt could not be resolved to a workflow.
    #[error("resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    /// No workflow with this id is visible to the caller.
    #[error("workflow not found: {workflow_id}")]
    NotFound { workflow_id: String },

    // -- Recorded execution failures -----------------------------------------
    /// Some required apps lack a credential or an active connection.
    #[error("missing credentials for: {}", join_apps(.missing))]
    MissingCredentials { missing: Vec<AppId> },

    /// No handler is registered for the workflow's capability key.
    #[error("no handler registered for capability: {capability}")]
    NoHandler { capability: String },

    /// The handler has no operation matching the workflow's metadata.
    #[error("no operation of {capability} matches workflow `{workflow}`")]
    NoMatchingOperation { capability: String, workflow: String },

    /// The handler ran and failed, or exceeded its time budget.
    #[error("handler execution failed: {0}")]
    HandlerExecution(HandlerError),

    // -- Upstream crate errors -----------------------------------------------
    /// A repository operation failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Resolution(_) => "resolution_failed",
            Self::NotFound { .. } => "not_found",
            Self::MissingCredentials { .. } => "missing_credentials",
            Self::NoHandler { .. } => "no_handler",
            Self::NoMatchingOperation { .. } => "no_matching_operation",
            Self::HandlerExecution(_) => "handler_execution",
            Self::Repository(_) => "repository",
        }
    }

    /// Failure detail attached to a failed execution record.
    pub fn detail(&self) -> Value {
        match self {
            Self::MissingCredentials { missing } => json!({
                "error": self.code(),
                "missing_apps": missing,
                "message": self.to_string(),
            }),
            Self::NoHandler { capability } => json!({
                "error": self.code(),
                "capability": capability,
                "message": self.to_string(),
            }),
            Self::NoMatchingOperation {
                capability,
                workflow,
            } => json!({
                "error": self.code(),
                "capability": capability,
                "workflow": workflow,
                "message": self.to_string(),
            }),
            Self::HandlerExecution(e) => json!({
                "error": self.code(),
                "app": e.app,
                "status": e.status,
                "code": e.code,
                "message": e.message,
            }),
            other => json!({
                "error": other.code(),
                "message": other.to_string(),
            }),
        }
    }
}

fn join_apps(apps: &[AppId]) -> String {
    apps.iter()
        .map(AppId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;
