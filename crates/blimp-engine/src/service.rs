//! Service facade.
//!
//! [`BlimpService`] wires the resolver, the coordinator and the repositories
//! together and returns the response shapes the outer surfaces serialize.

use std::sync::Arc;

use blimp_intent::{Classifier, IntentResolver, ResolverConfig};
use blimp_kernel::{
    AppCredential, AppId, CapabilityRegistry, ConnectedApp, ConnectionRepository,
    CredentialRepository, ExecutionRecord, ExecutionRepository, ExecutionStatus,
    InMemoryConnections, InMemoryCredentials, InMemoryExecutions, InMemoryTemplates,
    TemplateRepository, WorkflowDefinition,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::coordinator::{CoordinatorConfig, ExecutionCoordinator};
use crate::error::Result;

const RESOLVED_MESSAGE: &str =
    "Workflow processed successfully. Please connect the required apps to execute.";

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// The persistence backends the service runs on.
#[derive(Clone)]
pub struct Repositories {
    pub templates: Arc<dyn TemplateRepository>,
    pub credentials: Arc<dyn CredentialRepository>,
    pub connections: Arc<dyn ConnectionRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
}

impl Repositories {
    /// Ephemeral `DashMap`-backed repositories.
    pub fn in_memory() -> Self {
        Self {
            templates: Arc::new(InMemoryTemplates::new()),
            credentials: Arc::new(InMemoryCredentials::new()),
            connections: Arc::new(InMemoryConnections::new()),
            executions: Arc::new(InMemoryExecutions::new()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub resolver: ResolverConfig,
    pub execution: CoordinatorConfig,
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub workflow_id: String,
    pub workflow_name: String,
    pub workflow_description: String,
    pub required_apps: Vec<String>,
    pub is_new_workflow: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub result: Value,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub required_apps: Vec<String>,
    pub category: String,
}

impl From<&WorkflowDefinition> for WorkflowSummary {
    fn from(wf: &WorkflowDefinition) -> Self {
        Self {
            id: wf.id.clone(),
            name: wf.name.clone(),
            description: wf.description.clone(),
            required_apps: wf.required_apps.to_strings(),
            category: wf.category.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowList {
    pub success: bool,
    pub workflows: Vec<WorkflowSummary>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedAppList {
    pub success: bool,
    pub connected_apps: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHistory {
    pub success: bool,
    pub executions: Vec<ExecutionRecord>,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct BlimpService {
    resolver: IntentResolver,
    coordinator: ExecutionCoordinator,
    repos: Repositories,
}

impl BlimpService {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        registry: Arc<CapabilityRegistry>,
        repos: Repositories,
        config: ServiceConfig,
    ) -> Result<Self> {
        let resolver = IntentResolver::new(classifier, repos.templates.clone(), config.resolver)?
            .with_connections(repos.connections.clone());
        let coordinator = ExecutionCoordinator::new(
            registry,
            repos.templates.clone(),
            repos.credentials.clone(),
            repos.connections.clone(),
            repos.executions.clone(),
        )
        .with_config(config.execution);
        Ok(Self {
            resolver,
            coordinator,
            repos,
        })
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    /// Classify `prompt` and return the matched or newly created workflow.
    pub async fn resolve_workflow(
        &self,
        user_id: &str,
        prompt: &str,
        context: &Value,
    ) -> Result<ResolveResponse> {
        let resolved = self.resolver.resolve(prompt, context, user_id).await?;
        Ok(ResolveResponse {
            workflow_id: resolved.id,
            workflow_name: resolved.name,
            workflow_description: resolved.description,
            required_apps: resolved.required_apps.to_strings(),
            is_new_workflow: resolved.is_new,
            message: RESOLVED_MESSAGE.to_string(),
        })
    }

    pub async fn execute_workflow(
        &self,
        user_id: &str,
        workflow_id: &str,
        parameters: Value,
    ) -> Result<ExecuteResponse> {
        let outcome = self.coordinator.execute(user_id, workflow_id, parameters).await?;
        let message = match outcome.status {
            ExecutionStatus::Completed => "Workflow executed successfully".to_string(),
            _ => {
                let reason = outcome.result["message"]
                    .as_str()
                    .or_else(|| outcome.result["error"].as_str())
                    .unwrap_or("unknown error");
                format!("Workflow execution failed: {reason}")
            }
        };
        Ok(ExecuteResponse {
            execution_id: outcome.execution_id,
            status: outcome.status,
            result: outcome.result,
            message,
        })
    }

    /// Shared templates followed by the user's own workflows.
    pub async fn list_workflows(&self, user_id: &str) -> Result<WorkflowList> {
        let templates = self.repos.templates.list_templates().await?;
        let personal = self.repos.templates.list_for_user(user_id).await?;
        let workflows: Vec<WorkflowSummary> = templates
            .iter()
            .chain(personal.iter())
            .filter(|wf| wf.is_active && wf.visible_to(user_id))
            .map(WorkflowSummary::from)
            .collect();
        Ok(WorkflowList {
            success: true,
            count: workflows.len(),
            workflows,
        })
    }

    pub async fn list_connected_apps(&self, user_id: &str) -> Result<ConnectedAppList> {
        let connected_apps: Vec<String> = self
            .repos
            .connections
            .list_active(user_id)
            .await?
            .into_iter()
            .map(|c| c.app.as_str().to_string())
            .collect();
        Ok(ConnectedAppList {
            success: true,
            count: connected_apps.len(),
            connected_apps,
        })
    }

    /// Store `credential` and mark its app connected. Reconnecting replaces
    /// the previous credential.
    pub async fn connect_app(
        &self,
        user_id: &str,
        credential: AppCredential,
        metadata: Value,
    ) -> Result<ConnectedApp> {
        let app = credential.app();
        self.repos.credentials.upsert(user_id, credential, metadata).await?;
        let connection = self.repos.connections.mark_connected(user_id, app).await?;
        info!(user_id, %app, "app connected");
        Ok(connection)
    }

    /// Remove the credential and deactivate the connection. Returns `false`
    /// if no credential was stored.
    pub async fn disconnect_app(&self, user_id: &str, app: AppId) -> Result<bool> {
        let deleted = self.repos.credentials.delete(user_id, app).await?;
        let deactivated = self.repos.connections.deactivate(user_id, app).await?;
        info!(user_id, %app, deleted, deactivated, "app disconnected");
        Ok(deleted)
    }

    pub async fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        Ok(self.repos.executions.get(execution_id).await?)
    }

    pub async fn list_executions(&self, user_id: &str, limit: usize) -> Result<ExecutionHistory> {
        let executions = self.repos.executions.list_for_user(user_id, limit).await?;
        Ok(ExecutionHistory {
            success: true,
            count: executions.len(),
            executions,
        })
    }
}

#[cfg(test)]
mod tests {
    use blimp_intent::KeywordClassifier;
    use serde_json::json;

    use super::*;

    fn service() -> BlimpService {
        BlimpService::new(
            Arc::new(KeywordClassifier::new().unwrap()),
            Arc::new(CapabilityRegistry::empty()),
            Repositories::in_memory(),
            ServiceConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn resolve_response_shape() {
        let svc = service();
        let out = svc
            .resolve_workflow("u1", "Post Notion pages to Slack", &json!({}))
            .await
            .unwrap();
        assert!(out.is_new_workflow);
        assert_eq!(out.required_apps, vec!["slack", "notion"]);
        assert_eq!(out.message, RESOLVED_MESSAGE);

        let listed = svc.list_workflows("u1").await.unwrap();
        assert_eq!(listed.count, 1);
        assert_eq!(listed.workflows[0].id, out.workflow_id);
    }

    #[tokio::test]
    async fn connect_then_disconnect() {
        let svc = service();
        svc.connect_app(
            "u1",
            AppCredential::GitHub {
                token: "ghp_1".into(),
            },
            json!({ "login": "octocat" }),
        )
        .await
        .unwrap();
        let apps = svc.list_connected_apps("u1").await.unwrap();
        assert_eq!(apps.connected_apps, vec!["github"]);

        assert!(svc.disconnect_app("u1", AppId::GitHub).await.unwrap());
        assert_eq!(svc.list_connected_apps("u1").await.unwrap().count, 0);
        assert!(!svc.disconnect_app("u1", AppId::GitHub).await.unwrap());
    }

    #[tokio::test]
    async fn failed_execution_message_carries_reason() {
        let svc = service();
        let wf = svc
            .resolve_workflow("u1", "Post Notion pages to Slack", &json!({}))
            .await
            .unwrap();
        let out = svc.execute_workflow("u1", &wf.workflow_id, json!({})).await.unwrap();
        assert_eq!(out.status, ExecutionStatus::Failed);
        assert_eq!(out.result["error"], "missing_credentials");
        assert!(out.message.starts_with("Workflow execution failed: missing credentials for"));
    }
}
