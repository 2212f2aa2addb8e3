//! Offline keyword classifier.
//!
//! Finds application aliases in the prompt with a single leftmost-longest
//! `aho-corasick` scan. Deterministic and network-free, so it serves as the
//! fallback when no LLM is configured.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use async_trait::async_trait;
use tracing::debug;

use blimp_kernel::AppId;

use crate::classifier::{Classification, ClassificationRequest, Classifier};
use crate::error::{ResolutionError, Result};

/// Classifier that recognizes apps by name.
pub struct KeywordClassifier {
    automaton: AhoCorasick,
    /// Pattern index -> app.
    apps: Vec<AppId>,
}

impl KeywordClassifier {
    pub fn new() -> Result<Self> {
        let mut patterns = Vec::new();
        let mut apps = Vec::new();
        for app in AppId::ALL {
            for alias in app.aliases() {
                patterns.push(*alias);
                apps.push(app);
            }
        }

        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostLongest)
            .ascii_case_insensitive(true)
            .build(&patterns)
            .map_err(|e| {
                ResolutionError::Internal(format!("failed to build alias automaton: {e}"))
            })?;

        Ok(Self { automaton, apps })
    }

    /// Apps mentioned in `text`, in order of first mention.
    pub fn mentioned_apps(&self, text: &str) -> Vec<AppId> {
        let bytes = text.as_bytes();
        let mut found = Vec::new();
        for m in self.automaton.find_iter(text) {
            let before = m.start().checked_sub(1).map(|i| bytes[i]);
            let after = bytes.get(m.end()).copied();
            if before.is_some_and(|b| b.is_ascii_alphanumeric())
                || after.is_some_and(|b| b.is_ascii_alphanumeric())
            {
                continue;
            }
            let app = self.apps[m.pattern().as_usize()];
            if !found.contains(&app) {
                found.push(app);
            }
        }
        found
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn classify(&self, request: &ClassificationRequest) -> Result<Classification> {
        let apps = self.mentioned_apps(&request.prompt);
        debug!(apps = ?apps, "keyword scan");
        if apps.is_empty() {
            return Err(ResolutionError::MalformedResponse {
                reason: "prompt mentions no supported application".into(),
            });
        }

        let name = apps
            .iter()
            .map(|app| app.display_name())
            .collect::<Vec<_>>()
            .join(" to ");

        Ok(Classification {
            required_apps: apps.iter().map(|app| app.as_str().to_string()).collect(),
            name,
            description: request.prompt.trim().to_string(),
            category: None,
        })
    }
}
