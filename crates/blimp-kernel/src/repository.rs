//! Persistence contracts.
//!
//! Thin async traits over the durable stores. Implementations must give the
//! caller that just wrote a record read-after-write consistency. They carry
//! no business logic beyond the invariants they guard: uniqueness per
//! `(user_id, app)` and compare-and-set status updates.

use async_trait::async_trait;

use crate::app::AppId;
use crate::credential::{AppCredential, ConnectedApp, StoredCredential};
use crate::error::RepoResult;
use crate::execution::{ExecutionRecord, ExecutionStatus};
use crate::workflow::{NewWorkflow, WorkflowDefinition};

/// Shared templates and per-user workflows.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Persist a new definition with a fresh id and timestamps.
    async fn create(&self, workflow: NewWorkflow) -> RepoResult<WorkflowDefinition>;

    /// Fetch any definition (template or user workflow) by id.
    async fn get(&self, id: &str) -> RepoResult<Option<WorkflowDefinition>>;

    /// Active shared templates, most recently updated first.
    async fn list_templates(&self) -> RepoResult<Vec<WorkflowDefinition>>;

    /// Active user workflows owned by `user_id`, most recently updated first.
    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<WorkflowDefinition>>;
}

/// Which applications each user has authorized.
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    /// Active connections for `user_id`, in app order.
    async fn list_active(&self, user_id: &str) -> RepoResult<Vec<ConnectedApp>>;

    /// Insert or reactivate the `(user_id, app)` connection.
    async fn mark_connected(&self, user_id: &str, app: AppId) -> RepoResult<ConnectedApp>;

    /// Deactivate the connection. Returns `false` if there was none.
    async fn deactivate(&self, user_id: &str, app: AppId) -> RepoResult<bool>;
}

/// Credential material, unique per `(user_id, app)`.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Insert or replace the credential for `(user_id, credential.app())`.
    async fn upsert(
        &self,
        user_id: &str,
        credential: AppCredential,
        metadata: serde_json::Value,
    ) -> RepoResult<StoredCredential>;

    async fn get(&self, user_id: &str, app: AppId) -> RepoResult<Option<StoredCredential>>;

    /// Apps for which `user_id` has a stored credential.
    async fn list_apps(&self, user_id: &str) -> RepoResult<Vec<AppId>>;

    /// Remove the credential. Returns `false` if there was none.
    async fn delete(&self, user_id: &str, app: AppId) -> RepoResult<bool>;
}

/// Execution records.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Persist a new record. Its status must be `pending`.
    async fn create(&self, record: &ExecutionRecord) -> RepoResult<()>;

    async fn get(&self, id: &str) -> RepoResult<Option<ExecutionRecord>>;

    /// Move the record from `from` to `to`, attaching `result` if given.
    ///
    /// Fails with [`RepositoryError::InvalidTransition`] if the edge is not
    /// in the state machine or the stored status is not `from`.
    ///
    /// [`RepositoryError::InvalidTransition`]: crate::error::RepositoryError::InvalidTransition
    async fn transition(
        &self,
        id: &str,
        from: ExecutionStatus,
        to: ExecutionStatus,
        result: Option<serde_json::Value>,
    ) -> RepoResult<ExecutionRecord>;

    /// Most recent executions for `user_id`, newest first.
    async fn list_for_user(&self, user_id: &str, limit: usize) -> RepoResult<Vec<ExecutionRecord>>;
}
