//! Application identifiers and capability keys.
//!
//! An [`AppId`] names one third-party application. A [`CapabilityKey`] is
//! the order-independent set of applications a workflow touches; it is the
//! key under which exactly one capability handler is registered.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

// ---------------------------------------------------------------------------
// AppId
// ---------------------------------------------------------------------------

/// A supported third-party application.
///
/// Variant order defines the canonical ordering inside a [`CapabilityKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppId {
    Gmail,
    GCalendar,
    GDrive,
    GDocs,
    Slack,
    Notion,
    GitHub,
    Trello,
    Discord,
}

impl AppId {
    /// Every supported application, in canonical order.
    pub const ALL: [AppId; 9] = [
        Self::Gmail,
        Self::GCalendar,
        Self::GDrive,
        Self::GDocs,
        Self::Slack,
        Self::Notion,
        Self::GitHub,
        Self::Trello,
        Self::Discord,
    ];

    /// Canonical identifier, as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::GCalendar => "gcalendar",
            Self::GDrive => "gdrive",
            Self::GDocs => "gdocs",
            Self::Slack => "slack",
            Self::Notion => "notion",
            Self::GitHub => "github",
            Self::Trello => "trello",
            Self::Discord => "discord",
        }
    }

    /// Human-readable product name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Gmail => "Gmail",
            Self::GCalendar => "Google Calendar",
            Self::GDrive => "Google Drive",
            Self::GDocs => "Google Docs",
            Self::Slack => "Slack",
            Self::Notion => "Notion",
            Self::GitHub => "GitHub",
            Self::Trello => "Trello",
            Self::Discord => "Discord",
        }
    }

    /// Phrases that refer to this application in free text, lowercase.
    ///
    /// Includes the canonical id and the display name.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Gmail => &["gmail", "google mail", "email", "emails", "inbox"],
            Self::GCalendar => &[
                "gcalendar",
                "google calendar",
                "google_calendar",
                "calendar",
            ],
            Self::GDrive => &["gdrive", "google drive", "google_drive", "drive"],
            Self::GDocs => &["gdocs", "google docs", "google_docs", "google doc"],
            Self::Slack => &["slack"],
            Self::Notion => &["notion"],
            Self::GitHub => &["github", "git hub"],
            Self::Trello => &["trello"],
            Self::Discord => &["discord"],
        }
    }

    /// Parse a canonical id or alias, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|app| app.as_str() == needle || app.aliases().contains(&needle.as_str()))
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppId {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| KernelError::UnknownApp {
            value: s.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// CapabilityKey
// ---------------------------------------------------------------------------

/// Canonical, non-empty set of applications a workflow requires.
///
/// Equality and hashing ignore the order the applications were given in.
/// Serializes as an array of canonical ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<AppId>", into = "Vec<AppId>")]
pub struct CapabilityKey(BTreeSet<AppId>);

impl CapabilityKey {
    /// Build a key from any collection of apps. Duplicates collapse.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::EmptyCapability`] if no app is given.
    pub fn new(apps: impl IntoIterator<Item = AppId>) -> Result<Self> {
        let set: BTreeSet<AppId> = apps.into_iter().collect();
        if set.is_empty() {
            return Err(KernelError::EmptyCapability);
        }
        Ok(Self(set))
    }

    /// Key for exactly two applications.
    pub fn pair(a: AppId, b: AppId) -> Self {
        Self(BTreeSet::from([a, b]))
    }

    /// Parse a list of app identifiers (canonical ids or aliases).
    pub fn parse_list<S: AsRef<str>>(values: &[S]) -> Result<Self> {
        let apps = values
            .iter()
            .map(|v| v.as_ref().parse::<AppId>())
            .collect::<Result<Vec<_>>>()?;
        Self::new(apps)
    }

    /// Iterate the applications in canonical order.
    pub fn apps(&self) -> impl Iterator<Item = AppId> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, app: AppId) -> bool {
        self.0.contains(&app)
    }

    /// `true` if every app in `self` is also in `other`.
    pub fn is_subset(&self, other: &CapabilityKey) -> bool {
        self.0.is_subset(&other.0)
    }

    /// `true` if `self` is a subset of `other` and strictly smaller.
    pub fn is_proper_subset(&self, other: &CapabilityKey) -> bool {
        self.0.len() < other.0.len() && self.is_subset(other)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with collections.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical ids as owned strings, in canonical order.
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|a| a.as_str().to_string()).collect()
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for app in &self.0 {
            if !first {
                f.write_str("+")?;
            }
            f.write_str(app.as_str())?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for CapabilityKey {
    type Err = KernelError;

    /// Accepts `+` or `,` separated app identifiers.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s
            .split(['+', ','])
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        Self::parse_list(&parts)
    }
}

impl TryFrom<Vec<AppId>> for CapabilityKey {
    type Error = KernelError;

    fn try_from(apps: Vec<AppId>) -> Result<Self> {
        Self::new(apps)
    }
}

impl From<CapabilityKey> for Vec<AppId> {
    fn from(key: CapabilityKey) -> Self {
        key.0.into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
