//! Workflow definitions: shared templates and per-user workflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::CapabilityKey;

/// Category assigned when the classifier does not suggest one.
pub const DEFAULT_CATEGORY: &str = "custom";

/// Who a workflow definition belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowScope {
    /// Shared, reusable across all users.
    Template,
    /// Owned by one user, with the prompt that produced it.
    User { user_id: String, prompt: String },
}

/// A workflow template or user workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier (UUID v7).
    pub id: String,
    pub name: String,
    pub description: String,
    /// Never empty: [`CapabilityKey`] cannot be constructed empty.
    pub required_apps: CapabilityKey,
    pub category: String,
    pub scope: WorkflowScope,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn is_template(&self) -> bool {
        matches!(self.scope, WorkflowScope::Template)
    }

    /// The owning user for user workflows.
    pub fn owner(&self) -> Option<&str> {
        match &self.scope {
            WorkflowScope::Template => None,
            WorkflowScope::User { user_id, .. } => Some(user_id),
        }
    }

    /// Templates are visible to everyone; user workflows only to their owner.
    pub fn visible_to(&self, user_id: &str) -> bool {
        self.owner().is_none_or(|owner| owner == user_id)
    }

    /// Lowercased `name description`, the text operation predicates run on.
    pub fn metadata_text(&self) -> String {
        format!("{} {}", self.name, self.description).to_lowercase()
    }
}

/// Input for creating a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    pub description: String,
    pub required_apps: CapabilityKey,
    pub category: String,
    pub scope: WorkflowScope,
}

impl NewWorkflow {
    /// A shared template in the default category.
    pub fn template(
        name: impl Into<String>,
        description: impl Into<String>,
        required_apps: CapabilityKey,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required_apps,
            category: DEFAULT_CATEGORY.to_string(),
            scope: WorkflowScope::Template,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_scope(mut self, scope: WorkflowScope) -> Self {
        self.scope = scope;
        self
    }
}
