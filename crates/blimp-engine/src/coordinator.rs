//! Execution coordinator.
//!
//! Runs one workflow for one user: loads the definition, gates on
//! credentials and connections, dispatches to the capability handler and
//! records every status transition.
//!
//! ```text
//! pending ──► running ──► completed
//!    │           │
//!    └──────► failed ◄──┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use blimp_kernel::{
    AppId, CapabilityRegistry, ConnectionRepository, CredentialRepository, CredentialSet,
    ExecutionRecord, ExecutionRepository, ExecutionStatus, HandlerError, TemplateRepository,
    WorkflowDefinition, select_operation,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the execution coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Upper bound for a single handler invocation.
    #[serde(with = "secs")]
    pub handler_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(60),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Terminal outcome of one `execute` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    /// Handler output, or the failure detail.
    pub result: Value,
}

impl ExecutionResult {
    fn from_record(record: ExecutionRecord) -> Self {
        Self {
            execution_id: record.id,
            status: record.status,
            result: record.result.unwrap_or(Value::Null),
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct ExecutionCoordinator {
    registry: Arc<CapabilityRegistry>,
    templates: Arc<dyn TemplateRepository>,
    credentials: Arc<dyn CredentialRepository>,
    connections: Arc<dyn ConnectionRepository>,
    executions: Arc<dyn ExecutionRepository>,
    config: CoordinatorConfig,
}

impl ExecutionCoordinator {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        templates: Arc<dyn TemplateRepository>,
        credentials: Arc<dyn CredentialRepository>,
        connections: Arc<dyn ConnectionRepository>,
        executions: Arc<dyn ExecutionRepository>,
    ) -> Self {
        Self {
            registry,
            templates,
            credentials,
            connections,
            executions,
            config: CoordinatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Execute `workflow_id` on behalf of `user_id`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the workflow is absent or belongs to
    ///   another user. No record is created.
    /// - [`EngineError::Repository`] on storage faults that also prevent the
    ///   record from being marked `failed`.
    ///
    /// Gating, dispatch and handler failures are not errors: they come back
    /// as an [`ExecutionResult`] with status `failed`. So does a storage
    /// fault once the record exists, as long as the failure can be recorded.
    #[instrument(skip(self, parameters))]
    pub async fn execute(
        &self,
        user_id: &str,
        workflow_id: &str,
        parameters: Value,
    ) -> Result<ExecutionResult> {
        let workflow = self
            .templates
            .get(workflow_id)
            .await?
            .filter(|wf| wf.visible_to(user_id))
            .ok_or_else(|| EngineError::NotFound {
                workflow_id: workflow_id.to_string(),
            })?;

        let record = ExecutionRecord::pending(user_id, &workflow.id, parameters);
        self.executions.create(&record).await?;
        info!(execution_id = %record.id, workflow_id = %workflow.id, "execution created");

        let credentials = match self.gather_credentials(user_id, &workflow).await {
            Ok(Ok(credentials)) => credentials,
            Ok(Err(missing)) => {
                let err = EngineError::MissingCredentials { missing };
                return self.fail(&record.id, ExecutionStatus::Pending, err).await;
            }
            Err(err) => return self.abort(&record.id, ExecutionStatus::Pending, err).await,
        };

        if let Err(err) = self
            .executions
            .transition(&record.id, ExecutionStatus::Pending, ExecutionStatus::Running, None)
            .await
        {
            return self.abort(&record.id, ExecutionStatus::Pending, err.into()).await;
        }
        info!(execution_id = %record.id, "execution running");

        let output = match self.dispatch(&workflow, &credentials, &record.parameters).await {
            Ok(output) => output,
            Err(err) => return self.fail(&record.id, ExecutionStatus::Running, err).await,
        };
        let done = self
            .executions
            .transition(
                &record.id,
                ExecutionStatus::Running,
                ExecutionStatus::Completed,
                Some(output),
            )
            .await;
        match done {
            Ok(done) => {
                info!(execution_id = %done.id, "execution completed");
                Ok(ExecutionResult::from_record(done))
            }
            Err(err) => self.abort(&record.id, ExecutionStatus::Running, err.into()).await,
        }
    }

    /// Credentials for every required app, or the apps that lack one.
    ///
    /// An app counts as available only with both a stored credential and an
    /// active connection.
    async fn gather_credentials(
        &self,
        user_id: &str,
        workflow: &WorkflowDefinition,
    ) -> Result<std::result::Result<CredentialSet, Vec<AppId>>> {
        let connected: Vec<AppId> = self
            .connections
            .list_active(user_id)
            .await?
            .into_iter()
            .map(|c| c.app)
            .collect();

        let mut set = CredentialSet::new();
        let mut missing = Vec::new();
        for app in workflow.required_apps.apps() {
            let stored = if connected.contains(&app) {
                self.credentials.get(user_id, app).await?
            } else {
                None
            };
            match stored {
                Some(stored) => set.insert(stored.credential),
                None => missing.push(app),
            }
        }
        debug!(available = set.len(), missing = missing.len(), "credentials gathered");

        if missing.is_empty() {
            Ok(Ok(set))
        } else {
            Ok(Err(missing))
        }
    }

    async fn dispatch(
        &self,
        workflow: &WorkflowDefinition,
        credentials: &CredentialSet,
        parameters: &Value,
    ) -> Result<Value> {
        let key = &workflow.required_apps;
        let handler = self
            .registry
            .lookup(key)
            .map_err(|_| EngineError::NoHandler {
                capability: key.to_string(),
            })?;
        let operation = select_operation(handler.operations(), workflow).ok_or_else(|| {
            EngineError::NoMatchingOperation {
                capability: key.to_string(),
                workflow: workflow.name.clone(),
            }
        })?;
        info!(capability = %key, operation = operation.name, "handler selected");

        let timeout = self.config.handler_timeout;
        let invocation = handler.invoke(operation, credentials, parameters);
        match tokio::time::timeout(timeout, invocation).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(EngineError::HandlerExecution(e)),
            Err(_elapsed) => Err(EngineError::HandlerExecution(
                HandlerError::new(format!("handler timed out after {}s", timeout.as_secs()))
                    .with_code("timeout"),
            )),
        }
    }

    async fn fail(
        &self,
        execution_id: &str,
        from: ExecutionStatus,
        err: EngineError,
    ) -> Result<ExecutionResult> {
        warn!(execution_id, code = err.code(), error = %err, "execution failed");
        let failed = self
            .executions
            .transition(execution_id, from, ExecutionStatus::Failed, Some(err.detail()))
            .await?;
        Ok(ExecutionResult::from_record(failed))
    }

    /// Record a storage fault hit after the record was created. If the
    /// record cannot be marked `failed` either, `err` is returned as is.
    async fn abort(
        &self,
        execution_id: &str,
        from: ExecutionStatus,
        err: EngineError,
    ) -> Result<ExecutionResult> {
        warn!(execution_id, code = err.code(), error = %err, "execution aborted");
        let failed = self
            .executions
            .transition(execution_id, from, ExecutionStatus::Failed, Some(err.detail()))
            .await;
        match failed {
            Ok(failed) => Ok(ExecutionResult::from_record(failed)),
            Err(write) => {
                warn!(execution_id, error = %write, "could not mark execution failed");
                Err(err)
            }
        }
    }
}
