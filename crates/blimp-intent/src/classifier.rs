//! Prompt classification.
//!
//! A [`Classifier`] turns a natural-language prompt into the set of
//! applications it needs plus a name and description for the workflow.
//! Raw classifier output is a [`Classification`]; [`Classification::validate`]
//! turns it into a [`ClassifiedIntent`] or rejects it as malformed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use blimp_kernel::{AppId, CapabilityKey, DEFAULT_CATEGORY, WorkflowDefinition};

use crate::error::{ResolutionError, Result};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One candidate definition as shown to the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogueEntry {
    pub id: String,
    pub name: String,
    pub required_apps: Vec<String>,
    pub category: String,
}

impl From<&WorkflowDefinition> for CatalogueEntry {
    fn from(wf: &WorkflowDefinition) -> Self {
        Self {
            id: wf.id.clone(),
            name: wf.name.clone(),
            required_apps: wf.required_apps.to_strings(),
            category: wf.category.clone(),
        }
    }
}

/// Everything a classifier may look at.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub prompt: String,
    /// Caller-supplied context, passed through verbatim.
    pub context: serde_json::Value,
    pub catalogue: Vec<CatalogueEntry>,
    pub connected_apps: Vec<AppId>,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Raw classifier output, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub required_apps: Vec<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// A validated classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedIntent {
    pub required_apps: CapabilityKey,
    pub name: String,
    pub description: String,
    pub category: String,
}

impl Classification {
    /// Reject unknown app identifiers, an empty app list and an empty name.
    pub fn validate(self) -> Result<ClassifiedIntent> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(malformed("workflow name is empty"));
        }
        if self.required_apps.is_empty() {
            return Err(malformed("required_apps is empty"));
        }

        let mut apps = Vec::with_capacity(self.required_apps.len());
        for value in &self.required_apps {
            let app = AppId::parse(value)
                .ok_or_else(|| malformed(format!("unknown application `{value}`")))?;
            apps.push(app);
        }
        let required_apps = CapabilityKey::new(apps).map_err(|e| malformed(e.to_string()))?;

        let category = self
            .category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        Ok(ClassifiedIntent {
            required_apps,
            name,
            description: self.description.trim().to_string(),
            category,
        })
    }
}

/// Parse classifier text into a [`Classification`].
///
/// Handles markdown code fences, and accepts either the bare object or one
/// nested under a `workflow` key.
pub fn parse_classification(text: &str) -> Result<Classification> {
    let cleaned = text.trim();
    let cleaned = cleaned.strip_prefix("```json").unwrap_or(cleaned);
    let cleaned = cleaned.strip_prefix("```").unwrap_or(cleaned);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned);
    let cleaned = cleaned.trim();

    let mut value: serde_json::Value = serde_json::from_str(cleaned)
        .map_err(|e| malformed(format!("response is not valid JSON: {e}")))?;

    if value.get("workflow").is_some_and(|w| w.is_object()) {
        value = value["workflow"].take();
    }
    if !value.is_object() {
        return Err(malformed("expected a JSON object"));
    }

    serde_json::from_value(value).map_err(|e| malformed(format!("unexpected shape: {e}")))
}

fn malformed(reason: impl Into<String>) -> ResolutionError {
    ResolutionError::MalformedResponse {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Maps a prompt to a [`Classification`].
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    async fn classify(&self, request: &ClassificationRequest) -> Result<Classification>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
