//! The capability handler seam.
//!
//! A [`CapabilityHandler`] performs operations across exactly one set of
//! applications. Failures surface as [`HandlerError`], which keeps whatever
//! detail the originating application returned.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::app::{AppId, CapabilityKey};
use crate::credential::CredentialSet;
use crate::operation::OperationSpec;

/// A failure surfaced by a handler, usually from an external API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerError {
    /// Application whose API produced the error, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<AppId>,
    /// HTTP status returned by the application.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Provider-specific error code (e.g. Slack's `channel_not_found`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            app: None,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// An error reported by `app`.
    pub fn from_app(app: AppId, message: impl Into<String>) -> Self {
        Self::new(message).with_app(app)
    }

    /// The caller supplied unusable parameters.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(message).with_code("invalid_params")
    }

    /// The credential set lacks an entry the handler needs.
    pub fn missing_credential(app: AppId) -> Self {
        Self::from_app(app, format!("no credential supplied for {app}"))
            .with_code("missing_credential")
    }

    pub fn with_app(mut self, app: AppId) -> Self {
        self.app = Some(app);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(app) = self.app {
            write!(f, "{app}")?;
            if let Some(status) = self.status {
                write!(f, " ({status})")?;
            }
            f.write_str(": ")?;
        }
        f.write_str(&self.message)?;
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for HandlerError {}

/// Performs operations across a fixed set of applications.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// The exact set of applications this handler serves.
    fn capability(&self) -> CapabilityKey;

    /// Operations in evaluation order. Must be non-empty and fixed for the
    /// lifetime of the handler.
    fn operations(&self) -> &[OperationSpec];

    /// Run `operation` with credentials for the required applications.
    async fn invoke(
        &self,
        operation: &OperationSpec,
        credentials: &CredentialSet,
        parameters: &serde_json::Value,
    ) -> Result<serde_json::Value, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_provider_detail() {
        let err = HandlerError::from_app(AppId::Slack, "channel missing")
            .with_status(404)
            .with_code("channel_not_found");
        assert_eq!(err.to_string(), "slack (404): channel missing [channel_not_found]");
    }

    #[test]
    fn serializes_only_known_fields() {
        let json = serde_json::to_value(HandlerError::new("boom")).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "boom" }));

        let json = serde_json::to_value(HandlerError::missing_credential(AppId::Notion)).unwrap();
        assert_eq!(json["app"], "notion");
        assert_eq!(json["code"], "missing_credential");
    }
}
