//! Typed credential material and application connections.
//!
//! Each application's secret is a variant of [`AppCredential`] carrying only
//! what that application's client needs. Handlers receive a
//! [`CredentialSet`] restricted to the workflow's required applications.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::{AppId, CapabilityKey};

/// OAuth2 bearer token issued by Google for Gmail, Calendar, Drive or Docs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp after which the access token is no longer valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl OAuthToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Credential material for one application, tagged by application id.
///
/// ```json
/// { "app": "slack", "bot_token": "xoxb-..." }
/// { "app": "gmail", "access_token": "ya29...", "refresh_token": "1//..." }
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "app", rename_all = "lowercase")]
pub enum AppCredential {
    Gmail(OAuthToken),
    GCalendar(OAuthToken),
    GDrive(OAuthToken),
    GDocs(OAuthToken),
    Slack { bot_token: String },
    Notion { integration_token: String },
    GitHub { token: String },
    Trello { api_key: String, token: String },
    Discord { bot_token: String },
}

impl AppCredential {
    /// The application this credential authenticates against.
    pub fn app(&self) -> AppId {
        match self {
            Self::Gmail(_) => AppId::Gmail,
            Self::GCalendar(_) => AppId::GCalendar,
            Self::GDrive(_) => AppId::GDrive,
            Self::GDocs(_) => AppId::GDocs,
            Self::Slack { .. } => AppId::Slack,
            Self::Notion { .. } => AppId::Notion,
            Self::GitHub { .. } => AppId::GitHub,
            Self::Trello { .. } => AppId::Trello,
            Self::Discord { .. } => AppId::Discord,
        }
    }

    /// The Google OAuth token, for the Google family of apps.
    pub fn oauth(&self) -> Option<&OAuthToken> {
        match self {
            Self::Gmail(t) | Self::GCalendar(t) | Self::GDrive(t) | Self::GDocs(t) => Some(t),
            _ => None,
        }
    }

    /// A single bearer secret for apps that authenticate with one token.
    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Self::Gmail(t) | Self::GCalendar(t) | Self::GDrive(t) | Self::GDocs(t) => {
                Some(t.access_token.as_str())
            }
            Self::Slack { bot_token } | Self::Discord { bot_token } => Some(bot_token),
            Self::Notion { integration_token } => Some(integration_token),
            Self::GitHub { token } => Some(token),
            Self::Trello { .. } => None,
        }
    }
}

impl fmt::Debug for AppCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppCredential({}, <redacted>)", self.app())
    }
}

/// Credentials handed to a handler, one per required application.
#[derive(Debug, Clone, Default)]
pub struct CredentialSet {
    inner: BTreeMap<AppId, AppCredential>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a credential, replacing any previous one for the same app.
    pub fn insert(&mut self, credential: AppCredential) {
        self.inner.insert(credential.app(), credential);
    }

    pub fn get(&self, app: AppId) -> Option<&AppCredential> {
        self.inner.get(&app)
    }

    /// Bearer secret for `app`, if present.
    pub fn bearer_token(&self, app: AppId) -> Option<&str> {
        self.get(app).and_then(AppCredential::bearer_token)
    }

    /// Applications in `key` that have no credential in this set.
    pub fn missing_for(&self, key: &CapabilityKey) -> Vec<AppId> {
        key.apps().filter(|app| !self.inner.contains_key(app)).collect()
    }

    pub fn apps(&self) -> impl Iterator<Item = AppId> + '_ {
        self.inner.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl FromIterator<AppCredential> for CredentialSet {
    fn from_iter<I: IntoIterator<Item = AppCredential>>(iter: I) -> Self {
        let mut set = Self::new();
        for credential in iter {
            set.insert(credential);
        }
        set
    }
}

/// A credential as persisted for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub user_id: String,
    pub credential: AppCredential,
    /// Free-form metadata supplied at connection time (account email, scopes).
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredCredential {
    pub fn app(&self) -> AppId {
        self.credential.app()
    }
}

/// A user's authorization record for one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedApp {
    pub user_id: String,
    pub app: AppId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_json_shape() {
        let cred = AppCredential::Slack {
            bot_token: "xoxb-1".into(),
        };
        let json = serde_json::to_value(&cred).unwrap();
        assert_eq!(json, serde_json::json!({ "app": "slack", "bot_token": "xoxb-1" }));

        let google: AppCredential = serde_json::from_value(serde_json::json!({
            "app": "gcalendar",
            "access_token": "ya29.abc"
        }))
        .unwrap();
        assert_eq!(google.app(), AppId::GCalendar);
        assert_eq!(google.oauth().unwrap().access_token, "ya29.abc");
    }

    #[test]
    fn wrong_fields_for_app_are_rejected() {
        let bad = serde_json::from_value::<AppCredential>(serde_json::json!({
            "app": "trello",
            "token": "only-half"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cred = AppCredential::GitHub {
            token: "ghp_secret".into(),
        };
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("github"));

        let token = OAuthToken::new("ya29.secret");
        assert!(!format!("{token:?}").contains("ya29.secret"));
    }

    #[test]
    fn credential_set_reports_missing_apps() {
        let set: CredentialSet = [AppCredential::Gmail(OAuthToken::new("t"))]
            .into_iter()
            .collect();
        let key = CapabilityKey::new([AppId::Gmail, AppId::GCalendar]).unwrap();
        assert_eq!(set.missing_for(&key), vec![AppId::GCalendar]);
        assert_eq!(set.bearer_token(AppId::Gmail), Some("t"));
        assert_eq!(set.bearer_token(AppId::Slack), None);
    }

    #[test]
    fn trello_has_no_single_bearer() {
        let cred = AppCredential::Trello {
            api_key: "k".into(),
            token: "t".into(),
        };
        assert_eq!(cred.bearer_token(), None);
    }
}
