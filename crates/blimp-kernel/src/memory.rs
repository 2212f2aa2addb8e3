//! In-memory repository implementations backed by [`DashMap`].
//!
//! Used by tests and for ephemeral runs where nothing needs to survive the
//! process. All types are cheaply cloneable (`Arc`-backed) and share state
//! between clones.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::app::AppId;
use crate::credential::{AppCredential, ConnectedApp, StoredCredential};
use crate::error::{RepoResult, RepositoryError};
use crate::execution::{ExecutionRecord, ExecutionStatus};
use crate::repository::{
    ConnectionRepository, CredentialRepository, ExecutionRepository, TemplateRepository,
};
use crate::workflow::{NewWorkflow, WorkflowDefinition, WorkflowScope};

fn newest_first(items: &mut [WorkflowDefinition]) {
    items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemoryTemplates {
    inner: Arc<DashMap<String, WorkflowDefinition>>,
}

impl InMemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed definition, e.g. to seed fixtures with fixed
    /// timestamps.
    pub fn insert(&self, workflow: WorkflowDefinition) {
        self.inner.insert(workflow.id.clone(), workflow);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplates {
    async fn create(&self, workflow: NewWorkflow) -> RepoResult<WorkflowDefinition> {
        let now = Utc::now();
        let definition = WorkflowDefinition {
            id: Uuid::now_v7().to_string(),
            name: workflow.name,
            description: workflow.description,
            required_apps: workflow.required_apps,
            category: workflow.category,
            scope: workflow.scope,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.inner.insert(definition.id.clone(), definition.clone());
        Ok(definition)
    }

    async fn get(&self, id: &str) -> RepoResult<Option<WorkflowDefinition>> {
        Ok(self.inner.get(id).map(|entry| entry.value().clone()))
    }

    async fn list_templates(&self) -> RepoResult<Vec<WorkflowDefinition>> {
        let mut out: Vec<WorkflowDefinition> = self
            .inner
            .iter()
            .filter(|e| e.is_active && e.is_template())
            .map(|e| e.value().clone())
            .collect();
        newest_first(&mut out);
        Ok(out)
    }

    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<WorkflowDefinition>> {
        let mut out: Vec<WorkflowDefinition> = self
            .inner
            .iter()
            .filter(|e| {
                let owned = matches!(
                    &e.scope,
                    WorkflowScope::User { user_id: owner, .. } if owner == user_id
                );
                e.is_active && owned
            })
            .map(|e| e.value().clone())
            .collect();
        newest_first(&mut out);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemoryConnections {
    inner: Arc<DashMap<(String, AppId), ConnectedApp>>,
}

impl InMemoryConnections {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnections {
    async fn list_active(&self, user_id: &str) -> RepoResult<Vec<ConnectedApp>> {
        let mut out: Vec<ConnectedApp> = self
            .inner
            .iter()
            .filter(|e| e.user_id == user_id && e.is_active)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|c| c.app);
        Ok(out)
    }

    async fn mark_connected(&self, user_id: &str, app: AppId) -> RepoResult<ConnectedApp> {
        let now = Utc::now();
        let mut entry = self
            .inner
            .entry((user_id.to_string(), app))
            .or_insert_with(|| ConnectedApp {
                user_id: user_id.to_string(),
                app,
                is_active: true,
                created_at: now,
                updated_at: now,
            });
        entry.is_active = true;
        entry.updated_at = now;
        Ok(entry.value().clone())
    }

    async fn deactivate(&self, user_id: &str, app: AppId) -> RepoResult<bool> {
        match self.inner.get_mut(&(user_id.to_string(), app)) {
            Some(mut entry) => {
                entry.is_active = false;
                entry.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemoryCredentials {
    inner: Arc<DashMap<(String, AppId), StoredCredential>>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored credentials across all users.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentials {
    async fn upsert(
        &self,
        user_id: &str,
        credential: AppCredential,
        metadata: serde_json::Value,
    ) -> RepoResult<StoredCredential> {
        let now = Utc::now();
        let key = (user_id.to_string(), credential.app());
        let created_at = self.inner.get(&key).map(|e| e.created_at).unwrap_or(now);
        let stored = StoredCredential {
            user_id: user_id.to_string(),
            credential,
            metadata,
            created_at,
            updated_at: now,
        };
        self.inner.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get(&self, user_id: &str, app: AppId) -> RepoResult<Option<StoredCredential>> {
        Ok(self
            .inner
            .get(&(user_id.to_string(), app))
            .map(|e| e.value().clone()))
    }

    async fn list_apps(&self, user_id: &str) -> RepoResult<Vec<AppId>> {
        let mut apps: Vec<AppId> = self
            .inner
            .iter()
            .filter(|e| e.key().0 == user_id)
            .map(|e| e.key().1)
            .collect();
        apps.sort();
        Ok(apps)
    }

    async fn delete(&self, user_id: &str, app: AppId) -> RepoResult<bool> {
        Ok(self.inner.remove(&(user_id.to_string(), app)).is_some())
    }
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemoryExecutions {
    inner: Arc<DashMap<String, ExecutionRecord>>,
}

impl InMemoryExecutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutions {
    async fn create(&self, record: &ExecutionRecord) -> RepoResult<()> {
        if record.status != ExecutionStatus::Pending {
            return Err(RepositoryError::InvalidTransition {
                id: record.id.clone(),
                from: "none".into(),
                to: record.status.to_string(),
            });
        }
        self.inner.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> RepoResult<Option<ExecutionRecord>> {
        Ok(self.inner.get(id).map(|e| e.value().clone()))
    }

    async fn transition(
        &self,
        id: &str,
        from: ExecutionStatus,
        to: ExecutionStatus,
        result: Option<serde_json::Value>,
    ) -> RepoResult<ExecutionRecord> {
        let mut entry = self
            .inner
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "execution",
                id: id.to_string(),
            })?;

        if entry.status != from || !from.can_transition_to(to) {
            return Err(RepositoryError::InvalidTransition {
                id: id.to_string(),
                from: entry.status.to_string(),
                to: to.to_string(),
            });
        }

        entry.status = to;
        if result.is_some() {
            entry.result = result;
        }
        entry.updated_at = Utc::now();
        Ok(entry.value().clone())
    }

    async fn list_for_user(&self, user_id: &str, limit: usize) -> RepoResult<Vec<ExecutionRecord>> {
        let mut out: Vec<ExecutionRecord> = self
            .inner
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        out.truncate(limit);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::CapabilityKey;
    use crate::credential::OAuthToken;

    fn gmail_calendar() -> CapabilityKey {
        CapabilityKey::new([AppId::Gmail, AppId::GCalendar]).unwrap()
    }

    #[tokio::test]
    async fn templates_and_user_workflows_are_listed_separately() {
        let repo = InMemoryTemplates::new();
        repo.create(NewWorkflow::template("Shared", "d", gmail_calendar()))
            .await
            .unwrap();
        repo.create(
            NewWorkflow::template("Mine", "d", gmail_calendar()).with_scope(WorkflowScope::User {
                user_id: "alice".into(),
                prompt: "p".into(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(repo.list_templates().await.unwrap().len(), 1);
        assert_eq!(repo.list_for_user("alice").await.unwrap().len(), 1);
        assert!(repo.list_for_user("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn credential_upsert_replaces_material() {
        let repo = InMemoryCredentials::new();
        repo.upsert(
            "u",
            AppCredential::Gmail(OAuthToken::new("first")),
            serde_json::json!({}),
        )
        .await
        .unwrap();
        let second = repo
            .upsert(
                "u",
                AppCredential::Gmail(OAuthToken::new("second")),
                serde_json::json!({ "email": "u@example.com" }),
            )
            .await
            .unwrap();

        assert_eq!(repo.len(), 1);
        let stored = repo.get("u", AppId::Gmail).await.unwrap().unwrap();
        assert_eq!(stored.credential.bearer_token(), Some("second"));
        assert_eq!(stored.created_at, second.created_at);
    }

    #[tokio::test]
    async fn connections_toggle_active() {
        let repo = InMemoryConnections::new();
        repo.mark_connected("u", AppId::Slack).await.unwrap();
        repo.mark_connected("u", AppId::Slack).await.unwrap();
        assert_eq!(repo.list_active("u").await.unwrap().len(), 1);

        assert!(repo.deactivate("u", AppId::Slack).await.unwrap());
        assert!(repo.list_active("u").await.unwrap().is_empty());
        assert!(!repo.deactivate("u", AppId::Notion).await.unwrap());
    }

    #[tokio::test]
    async fn execution_transitions_are_compare_and_set() {
        let repo = InMemoryExecutions::new();
        let record = ExecutionRecord::pending("u", "wf", serde_json::json!({}));
        repo.create(&record).await.unwrap();

        repo.transition(&record.id, ExecutionStatus::Pending, ExecutionStatus::Running, None)
            .await
            .unwrap();

        // Stale expectation.
        let stale = repo
            .transition(&record.id, ExecutionStatus::Pending, ExecutionStatus::Failed, None)
            .await;
        assert!(matches!(stale, Err(RepositoryError::InvalidTransition { .. })));

        let done = repo
            .transition(
                &record.id,
                ExecutionStatus::Running,
                ExecutionStatus::Completed,
                Some(serde_json::json!({ "ok": true })),
            )
            .await
            .unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.result, Some(serde_json::json!({ "ok": true })));

        // Terminal.
        let reopen = repo
            .transition(&record.id, ExecutionStatus::Completed, ExecutionStatus::Running, None)
            .await;
        assert!(reopen.is_err());
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let repo = InMemoryExecutions::new();
        let err = repo
            .transition("nope", ExecutionStatus::Pending, ExecutionStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { entity: "execution", .. }));
    }
}
