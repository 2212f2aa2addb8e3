//! Workflow definition persistence.
//!
//! Shared templates live in `workflow_templates`; per-user workflows live in
//! `user_workflows` together with the prompt that produced them. Both map to
//! [`WorkflowDefinition`], distinguished by [`WorkflowScope`].

use async_trait::async_trait;
use blimp_kernel::{
    CapabilityKey, NewWorkflow, RepoResult, TemplateRepository, WorkflowDefinition, WorkflowScope,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

const TEMPLATE_SELECT: &str = "SELECT id, name, description, required_apps, category, is_active, \
     created_at, updated_at, NULL, NULL FROM workflow_templates";

const USER_WORKFLOW_SELECT: &str = "SELECT id, name, description, required_apps, category, \
     is_active, created_at, updated_at, user_id, prompt FROM user_workflows";

// ═══════════════════════════════════════════════════════════════════════
//  TemplateStore
// ═══════════════════════════════════════════════════════════════════════

/// CRUD operations on workflow templates and user workflows.
#[derive(Clone)]
pub struct TemplateStore {
    db: Database,
}

impl TemplateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new definition with a UUID v7 id and both timestamps set to now.
    #[instrument(skip(self, workflow), fields(name = %workflow.name))]
    pub async fn create(&self, workflow: NewWorkflow) -> StoreResult<WorkflowDefinition> {
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
        let apps_json = serde_json::to_string(&definition.required_apps)?;
        let row = definition.clone();

        self.db
            .execute(move |conn| {
                let ts = row.created_at.timestamp();
                match &row.scope {
                    WorkflowScope::Template => conn.execute(
                        "INSERT INTO workflow_templates \
                         (id, name, description, required_apps, category, is_active, \
                          created_at, updated_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
                        rusqlite::params![
                            row.id,
                            row.name,
                            row.description,
                            apps_json,
                            row.category,
                            ts
                        ],
                    )?,
                    WorkflowScope::User { user_id, prompt } => conn.execute(
                        "INSERT INTO user_workflows \
                         (id, user_id, name, description, prompt, required_apps, category, \
                          is_active, created_at, updated_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
                        rusqlite::params![
                            row.id,
                            user_id,
                            row.name,
                            row.description,
                            prompt,
                            apps_json,
                            row.category,
                            ts
                        ],
                    )?,
                };
                Ok(())
            })
            .await?;

        debug!(
            workflow_id = %definition.id,
            template = definition.is_template(),
            required_apps = %definition.required_apps,
            "workflow definition created"
        );
        Ok(definition)
    }

    /// Fetch a template or user workflow by id.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Option<WorkflowDefinition>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                for select in [TEMPLATE_SELECT, USER_WORKFLOW_SELECT] {
                    let sql = format!("{select} WHERE id = ?1");
                    let row = conn
                        .query_row(&sql, rusqlite::params![id], WorkflowRow::from_row)
                        .optional()?;
                    if let Some(row) = row {
                        return row.into_definition().map(Some);
                    }
                }
                Ok(None)
            })
            .await
    }

    /// Active shared templates, most recently updated first.
    #[instrument(skip(self))]
    pub async fn list_templates(&self) -> StoreResult<Vec<WorkflowDefinition>> {
        self.db
            .execute(|conn| {
                query_all(
                    conn,
                    &format!(
                        "{TEMPLATE_SELECT} WHERE is_active = 1 ORDER BY updated_at DESC, id DESC"
                    ),
                    [],
                )
            })
            .await
    }

    /// Active user workflows owned by `user_id`, most recently updated first.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<WorkflowDefinition>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                query_all(
                    conn,
                    &format!(
                        "{USER_WORKFLOW_SELECT} WHERE user_id = ?1 AND is_active = 1 \
                         ORDER BY updated_at DESC, id DESC"
                    ),
                    rusqlite::params![user_id],
                )
            })
            .await
    }

    /// Hide a definition from listings and matching. Existing execution
    /// records that reference it are unaffected.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let mut updated = 0;
                for table in ["workflow_templates", "user_workflows"] {
                    updated += conn.execute(
                        &format!("UPDATE {table} SET is_active = 0, updated_at = ?2 WHERE id = ?1"),
                        rusqlite::params![id, now],
                    )?;
                }
                if updated == 0 {
                    return Err(StoreError::NotFound {
                        entity: "workflow",
                        id,
                    });
                }
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl TemplateRepository for TemplateStore {
    async fn create(&self, workflow: NewWorkflow) -> RepoResult<WorkflowDefinition> {
        Ok(TemplateStore::create(self, workflow).await?)
    }

    async fn get(&self, id: &str) -> RepoResult<Option<WorkflowDefinition>> {
        Ok(TemplateStore::get(self, id).await?)
    }

    async fn list_templates(&self) -> RepoResult<Vec<WorkflowDefinition>> {
        Ok(TemplateStore::list_templates(self).await?)
    }

    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<WorkflowDefinition>> {
        Ok(TemplateStore::list_for_user(self, user_id).await?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Row mapping
// ═══════════════════════════════════════════════════════════════════════

/// Raw row before JSON decoding.
struct WorkflowRow {
    id: String,
    name: String,
    description: String,
    required_apps: String,
    category: String,
    is_active: bool,
    created_at: i64,
    updated_at: i64,
    user_id: Option<String>,
    prompt: Option<String>,
}

impl WorkflowRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            required_apps: row.get(3)?,
            category: row.get(4)?,
            is_active: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            user_id: row.get(8)?,
            prompt: row.get(9)?,
        })
    }

    fn into_definition(self) -> StoreResult<WorkflowDefinition> {
        let corrupt = |reason: String| StoreError::Corrupt {
            entity: "workflow",
            id: self.id.clone(),
            reason,
        };

        let apps: Vec<String> =
            serde_json::from_str(&self.required_apps).map_err(|e| corrupt(e.to_string()))?;
        let required_apps = CapabilityKey::parse_list(&apps).map_err(|e| corrupt(e.to_string()))?;
        let scope = match (self.user_id.clone(), self.prompt.clone()) {
            (Some(user_id), prompt) => WorkflowScope::User {
                user_id,
                prompt: prompt.unwrap_or_default(),
            },
            (None, _) => WorkflowScope::Template,
        };
        let created_at =
            timestamp(self.created_at).ok_or_else(|| corrupt("bad created_at".into()))?;
        let updated_at =
            timestamp(self.updated_at).ok_or_else(|| corrupt("bad updated_at".into()))?;

        Ok(WorkflowDefinition {
            id: self.id,
            name: self.name,
            description: self.description,
            required_apps,
            category: self.category,
            scope,
            is_active: self.is_active,
            created_at,
            updated_at,
        })
    }
}

fn query_all<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StoreResult<Vec<WorkflowDefinition>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, WorkflowRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(WorkflowRow::into_definition).collect()
}

pub(crate) fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

// ── tests ────────────────────────────────────────────────────────────
