//! Integration tests for the blimp-store crate.
//!
//! These run against a real SQLite file on disk (via tempfile) and go
//! through the repository traits the engine uses.

use std::sync::Arc;

use blimp_kernel::{
    AppId, CapabilityKey, ConnectionRepository, ExecutionRecord, ExecutionRepository,
    ExecutionStatus, NewWorkflow, RepositoryError, TemplateRepository, WorkflowScope,
};
use blimp_store::{ConnectionStore, Database, ExecutionStore, TemplateStore};

// ═══════════════════════════════════════════════════════════════════════
//  Database lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blimp.db");

    let id = {
        let db = Database::open_and_migrate(path.clone()).await.unwrap();
        let templates = TemplateStore::new(db);
        templates
            .create(NewWorkflow::template(
                "Email to Calendar",
                "Create calendar events from emails",
                CapabilityKey::new([AppId::Gmail, AppId::GCalendar]).unwrap(),
            ))
            .await
            .unwrap()
            .id
    };

    let db = Database::open_and_migrate(path).await.unwrap();
    let templates = TemplateStore::new(db);
    let fetched = templates.get(&id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Email to Calendar");
}

// ═══════════════════════════════════════════════════════════════════════
//  Through the repository traits
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn repositories_share_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_and_migrate(dir.path().join("shared.db"))
        .await
        .unwrap();

    let templates: Arc<dyn TemplateRepository> = Arc::new(TemplateStore::new(db.clone()));
    let connections: Arc<dyn ConnectionRepository> = Arc::new(ConnectionStore::new(db.clone()));
    let executions: Arc<dyn ExecutionRepository> = Arc::new(ExecutionStore::new(db));

    let wf = templates
        .create(
            NewWorkflow::template(
                "Standup digest",
                "Post calendar agenda to slack",
                CapabilityKey::new([AppId::GCalendar, AppId::Slack]).unwrap(),
            )
            .with_scope(WorkflowScope::User {
                user_id: "u1".into(),
                prompt: "post my agenda to slack".into(),
            }),
        )
        .await
        .unwrap();
    assert_eq!(templates.list_for_user("u1").await.unwrap()[0].id, wf.id);

    connections.mark_connected("u1", AppId::Slack).await.unwrap();
    assert_eq!(connections.list_active("u1").await.unwrap().len(), 1);

    let record =
        ExecutionRecord::pending("u1", &wf.id, serde_json::json!({ "channel": "#general" }));
    executions.create(&record).await.unwrap();
    executions
        .transition(
            &record.id,
            ExecutionStatus::Pending,
            ExecutionStatus::Failed,
            Some(serde_json::json!({
                "error": "missing_credentials",
                "missing_apps": ["gcalendar"]
            })),
        )
        .await
        .unwrap();

    let err = executions
        .transition(&record.id, ExecutionStatus::Failed, ExecutionStatus::Running, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidTransition { .. }));

    let history = executions.list_for_user("u1", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ExecutionStatus::Failed);
    assert_eq!(history[0].result.as_ref().unwrap()["missing_apps"][0], "gcalendar");
}

#[tokio::test]
async fn concurrent_executions_do_not_interfere() {
    let db = Database::in_memory_migrated().await.unwrap();
    let executions = ExecutionStore::new(db);

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = executions.clone();
        handles.push(tokio::spawn(async move {
            let record = ExecutionRecord::pending("u", format!("wf-{i}"), serde_json::json!({}));
            store.create(&record).await.unwrap();
            store
                .transition(&record.id, ExecutionStatus::Pending, ExecutionStatus::Running, None)
                .await
                .unwrap();
            store
                .transition(
                    &record.id,
                    ExecutionStatus::Running,
                    ExecutionStatus::Completed,
                    Some(serde_json::json!({ "i": i })),
                )
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        let record = handle.await.unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
    }
    assert_eq!(executions.list_for_user("u", 100).await.unwrap().len(), 8);
}
