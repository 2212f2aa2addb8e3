//! Capability handlers, one per supported set of applications.
//!
//! | Capability        | Operations (in evaluation order)                          |
//! |-------------------|-----------------------------------------------------------|
//! | `gmail+gcalendar` | `calendar_agenda_to_email`, `emails_to_calendar_events`   |
//! | `gmail+gdrive`    | `save_attachments_to_drive`                               |
//! | `gmail+notion`    | `notion_pages_to_email`                                   |
//! | `gcalendar+slack` | `calendar_events_to_slack`                                |
//! | `slack+github`    | `repository_updates_to_slack`                             |
//! | `slack+notion`    | `notion_pages_to_slack`                                   |
//!
//! Per-item failures are collected under `errors` in the result. A failed
//! initial fetch fails the whole operation.

pub mod calendar_slack;
pub mod github_slack;
pub mod gmail_calendar;
pub mod gmail_drive;
pub mod notion_gmail;
pub mod notion_slack;

pub use calendar_slack::CalendarSlackHandler;
pub use github_slack::GitHubSlackHandler;
pub use gmail_calendar::GmailCalendarHandler;
pub use gmail_drive::GmailDriveHandler;
pub use notion_gmail::NotionGmailHandler;
pub use notion_slack::NotionSlackHandler;

use blimp_kernel::{AppId, CredentialSet, HandlerError, OperationSpec};
use serde_json::Value;

/// Upper bound for any `max_*` parameter.
const MAX_ITEMS: u32 = 100;

/// Bearer token for `app`, or a `missing_credential` error.
pub(crate) fn token(credentials: &CredentialSet, app: AppId) -> Result<&str, HandlerError> {
    credentials
        .bearer_token(app)
        .ok_or_else(|| HandlerError::missing_credential(app))
}

pub(crate) fn unknown_operation(operation: &OperationSpec) -> HandlerError {
    HandlerError::new(format!("unknown operation `{}`", operation.name))
        .with_code("unknown_operation")
}

/// Typed access to caller parameters. A non-object value reads as empty.
pub(crate) struct Params<'a>(&'a Value);

impl<'a> Params<'a> {
    pub(crate) fn new(value: &'a Value) -> Self {
        Self(value)
    }

    /// Non-blank string parameter.
    pub(crate) fn str(&self, key: &str) -> Option<&'a str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub(crate) fn required_str(&self, key: &str) -> Result<&'a str, HandlerError> {
        self.str(key)
            .ok_or_else(|| HandlerError::invalid_params(format!("`{key}` is required")))
    }

    /// Positive count, given as a number or numeric string.
    pub(crate) fn count(&self, key: &str, default: u32) -> Result<u32, HandlerError> {
        let Some(value) = self.0.get(key).filter(|v| !v.is_null()) else {
            return Ok(default);
        };
        let parsed = value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()));
        match parsed {
            Some(n) if (1..=u64::from(MAX_ITEMS)).contains(&n) => Ok(n as u32),
            _ => Err(HandlerError::invalid_params(format!(
                "`{key}` must be an integer between 1 and {MAX_ITEMS}"
            ))),
        }
    }
}

/// At most `max` characters of `text`.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_read_strings_and_counts() {
        let raw = json!({ "channel": " #general ", "blank": "  ", "max": "7", "n": 3 });
        let p = Params::new(&raw);
        assert_eq!(p.str("channel"), Some("#general"));
        assert_eq!(p.str("blank"), None);
        assert_eq!(p.count("max", 10).unwrap(), 7);
        assert_eq!(p.count("n", 10).unwrap(), 3);
        assert_eq!(p.count("absent", 10).unwrap(), 10);
        assert!(p.required_str("missing").is_err());
    }

    #[test]
    fn counts_are_bounded() {
        let raw = json!({ "zero": 0, "huge": 1000, "neg": -1, "text": "ten" });
        let p = Params::new(&raw);
        for key in ["zero", "huge", "neg", "text"] {
            let err = p.count(key, 10).unwrap_err();
            assert_eq!(err.code.as_deref(), Some("invalid_params"));
        }
    }

    #[test]
    fn null_parameters_read_as_empty() {
        let p = Params::new(&Value::Null);
        assert_eq!(p.str("anything"), None);
        assert_eq!(p.count("max", 5).unwrap(), 5);
    }

    #[test]
    fn truncation_counts_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
