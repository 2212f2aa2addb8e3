//! Adapter error types.
//!
//! API clients surface failures through [`AdapterError`]. Each variant keeps
//! the application and whatever detail the provider returned, and converts
//! losslessly into the kernel's [`HandlerError`].

use blimp_kernel::{AppId, HandlerError};

/// Unified error type for Blimp adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The provider answered with an error.
    #[error("{app} API returned {status}: {message}")]
    Api {
        app: AppId,
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The request never produced a response.
    #[error("{app} request failed: {reason}")]
    Request { app: AppId, reason: String },

    /// The request exceeded the client timeout.
    #[error("{app} request timed out after {seconds}s")]
    Timeout { app: AppId, seconds: u64 },

    /// The provider answered, but not in the expected shape.
    #[error("unexpected {app} response: {reason}")]
    Decode { app: AppId, reason: String },

    /// Caller-supplied parameters are unusable.
    #[error("invalid parameters: {reason}")]
    InvalidParams { reason: String },

    /// Catch-all for unexpected internal errors.
    #[error("internal adapter error: {0}")]
    Internal(String),
}

impl AdapterError {
    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            reason: reason.into(),
        }
    }
}

impl From<AdapterError> for HandlerError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Api {
                app,
                status,
                code,
                message,
            } => {
                let e = HandlerError::from_app(app, message).with_status(status);
                match code {
                    Some(code) => e.with_code(code),
                    None => e,
                }
            }
            AdapterError::Request { app, reason } => {
                HandlerError::from_app(app, reason).with_code("request_failed")
            }
            AdapterError::Timeout { app, seconds } => {
                HandlerError::from_app(app, format!("request timed out after {seconds}s"))
                    .with_code("timeout")
            }
            AdapterError::Decode { app, reason } => {
                HandlerError::from_app(app, reason).with_code("invalid_response")
            }
            AdapterError::InvalidParams { reason } => HandlerError::invalid_params(reason),
            AdapterError::Internal(message) => HandlerError::new(message),
        }
    }
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
