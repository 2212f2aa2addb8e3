//! Execution record persistence.
//!
//! Status updates are compare-and-set: `UPDATE ... WHERE id = ? AND status = ?`.
//! A status that has already moved on, or an edge outside the state machine,
//! is rejected with [`StoreError::InvalidTransition`] and leaves the row
//! untouched.

use async_trait::async_trait;
use blimp_kernel::{ExecutionRecord, ExecutionRepository, ExecutionStatus, RepoResult};
use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::{debug, info, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::template_store::timestamp;

const SELECT: &str = "SELECT id, user_id, workflow_id, status, parameters, result, \
     created_at, updated_at FROM executions";

#[derive(Clone)]
pub struct ExecutionStore {
    db: Database,
}

impl ExecutionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a fresh `pending` record.
    #[instrument(skip(self, record), fields(execution_id = %record.id))]
    pub async fn create(&self, record: &ExecutionRecord) -> StoreResult<()> {
        if record.status != ExecutionStatus::Pending {
            return Err(StoreError::InvalidTransition {
                id: record.id.clone(),
                from: "none".into(),
                to: record.status.to_string(),
            });
        }
        let params_json = serde_json::to_string(&record.parameters)?;
        let result_json = record.result.as_ref().map(serde_json::to_string).transpose()?;
        let record = record.clone();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO executions \
                     (id, user_id, workflow_id, status, parameters, result, \
                      created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        record.id,
                        record.user_id,
                        record.workflow_id,
                        record.status.as_str(),
                        params_json,
                        result_json,
                        record.created_at.timestamp(),
                        record.updated_at.timestamp(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        debug!("execution record created");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Option<ExecutionRecord>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!("{SELECT} WHERE id = ?1"),
                    rusqlite::params![id],
                    ExecutionRow::from_row,
                )
                .optional()?
                .map(ExecutionRow::into_record)
                .transpose()
            })
            .await
    }

    /// Compare-and-set status update.
    #[instrument(skip(self, result))]
    pub async fn transition(
        &self,
        id: &str,
        from: ExecutionStatus,
        to: ExecutionStatus,
        result: Option<serde_json::Value>,
    ) -> StoreResult<ExecutionRecord> {
        let id = id.to_string();
        let result_json = result.as_ref().map(serde_json::to_string).transpose()?;
        let now = Utc::now().timestamp();

        let record = self
            .db
            .execute(move |conn| {
                let current: Option<String> = conn
                    .query_row(
                        "SELECT status FROM executions WHERE id = ?1",
                        rusqlite::params![id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(current) = current else {
                    return Err(StoreError::NotFound {
                        entity: "execution",
                        id,
                    });
                };

                let reject = || StoreError::InvalidTransition {
                    id: id.clone(),
                    from: current.clone(),
                    to: to.to_string(),
                };
                if !from.can_transition_to(to) {
                    return Err(reject());
                }

                let updated = conn.execute(
                    "UPDATE executions \
                     SET status = ?3, result = COALESCE(?4, result), updated_at = ?5 \
                     WHERE id = ?1 AND status = ?2",
                    rusqlite::params![id, from.as_str(), to.as_str(), result_json, now],
                )?;
                if updated == 0 {
                    return Err(reject());
                }

                conn.query_row(
                    &format!("{SELECT} WHERE id = ?1"),
                    rusqlite::params![id],
                    ExecutionRow::from_row,
                )?
                .into_record()
            })
            .await?;

        info!(execution_id = %record.id, from = %from, to = %to, "execution status changed");
        Ok(record)
    }

    /// Newest executions for `user_id`, at most `limit`.
    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<ExecutionRecord>> {
        let user_id = user_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT} WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![user_id, limit], ExecutionRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter().map(ExecutionRow::into_record).collect()
            })
            .await
    }
}

#[async_trait]
impl ExecutionRepository for ExecutionStore {
    async fn create(&self, record: &ExecutionRecord) -> RepoResult<()> {
        Ok(ExecutionStore::create(self, record).await?)
    }

    async fn get(&self, id: &str) -> RepoResult<Option<ExecutionRecord>> {
        Ok(ExecutionStore::get(self, id).await?)
    }

    async fn transition(
        &self,
        id: &str,
        from: ExecutionStatus,
        to: ExecutionStatus,
        result: Option<serde_json::Value>,
    ) -> RepoResult<ExecutionRecord> {
        Ok(ExecutionStore::transition(self, id, from, to, result).await?)
    }

    async fn list_for_user(&self, user_id: &str, limit: usize) -> RepoResult<Vec<ExecutionRecord>> {
        Ok(ExecutionStore::list_for_user(self, user_id, limit).await?)
    }
}

struct ExecutionRow {
    id: String,
    user_id: String,
    workflow_id: String,
    status: String,
    parameters: String,
    result: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl ExecutionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            workflow_id: row.get(2)?,
            status: row.get(3)?,
            parameters: row.get(4)?,
            result: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_record(self) -> StoreResult<ExecutionRecord> {
        let corrupt = |reason: String| StoreError::Corrupt {
            entity: "execution",
            id: self.id.clone(),
            reason,
        };
        let status = ExecutionStatus::parse(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status {}", self.status)))?;
        let parameters = serde_json::from_str(&self.parameters)?;
        let result = self.result.as_deref().map(serde_json::from_str).transpose()?;
        let created_at =
            timestamp(self.created_at).ok_or_else(|| corrupt("bad created_at".into()))?;
        let updated_at =
            timestamp(self.updated_at).ok_or_else(|| corrupt("bad updated_at".into()))?;

        Ok(ExecutionRecord {
            id: self.id,
            user_id: self.user_id,
            workflow_id: self.workflow_id,
            status,
            parameters,
            result,
            created_at,
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn store() -> ExecutionStore {
        ExecutionStore::new(Database::in_memory_migrated().await.unwrap())
    }

    #[tokio::test]
    async fn full_happy_path() {
        let store = store().await;
        let record = ExecutionRecord::pending("u", "wf", json!({ "max_emails": 10 }));
        store.create(&record).await.unwrap();

        let running = store
            .transition(&record.id, ExecutionStatus::Pending, ExecutionStatus::Running, None)
            .await
            .unwrap();
        assert_eq!(running.status, ExecutionStatus::Running);
        assert!(running.result.is_none());

        let done = store
            .transition(
                &record.id,
                ExecutionStatus::Running,
                ExecutionStatus::Completed,
                Some(json!({ "events_created": 2 })),
            )
            .await
            .unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.result, Some(json!({ "events_created": 2 })));
        assert_eq!(done.parameters, json!({ "max_emails": 10 }));
    }

    #[tokio::test]
    async fn stale_expected_status_is_rejected() {
        let store = store().await;
        let record = ExecutionRecord::pending("u", "wf", json!({}));
        store.create(&record).await.unwrap();
        store
            .transition(&record.id, ExecutionStatus::Pending, ExecutionStatus::Failed, None)
            .await
            .unwrap();

        let err = store
            .transition(&record.id, ExecutionStatus::Pending, ExecutionStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { ref from, .. } if from == "failed"));

        let stored = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn edges_outside_state_machine_are_rejected() {
        let store = store().await;
        let record = ExecutionRecord::pending("u", "wf", json!({}));
        store.create(&record).await.unwrap();

        let err = store
            .transition(&record.id, ExecutionStatus::Pending, ExecutionStatus::Completed, None)
            .await;
        assert!(matches!(err, Err(StoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn only_pending_records_can_be_created() {
        let store = store().await;
        let mut record = ExecutionRecord::pending("u", "wf", json!({}));
        record.status = ExecutionStatus::Running;
        assert!(store.create(&record).await.is_err());
    }

    #[tokio::test]
    async fn unknown_execution() {
        let store = store().await;
        assert!(store.get("nope").await.unwrap().is_none());
        let err = store
            .transition("nope", ExecutionStatus::Pending, ExecutionStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "execution", .. }));
    }
}
