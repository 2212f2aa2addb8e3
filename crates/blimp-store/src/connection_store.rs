//! Which applications each user has authorized.
//!
//! One row per `(user_id, app_type)`; reconnecting reactivates the existing
//! row instead of inserting a second one.

use async_trait::async_trait;
use blimp_kernel::{AppId, ConnectedApp, ConnectionRepository, RepoResult};
use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::template_store::timestamp;

#[derive(Clone)]
pub struct ConnectionStore {
    db: Database,
}

impl ConnectionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or reactivate the `(user_id, app)` row.
    #[instrument(skip(self))]
    pub async fn mark_connected(&self, user_id: &str, app: AppId) -> StoreResult<ConnectedApp> {
        let user_id = user_id.to_string();
        let now = Utc::now().timestamp();
        let connected = self
            .db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO connected_apps \
                     (user_id, app_type, app_name, is_active, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, 1, ?4, ?4) \
                     ON CONFLICT(user_id, app_type) \
                     DO UPDATE SET is_active = 1, updated_at = excluded.updated_at",
                    rusqlite::params![user_id, app.as_str(), app.display_name(), now],
                )?;
                fetch(conn, &user_id, app)?.ok_or_else(|| StoreError::NotFound {
                    entity: "connected_app",
                    id: format!("{user_id}/{app}"),
                })
            })
            .await?;
        debug!(user_id = %connected.user_id, app = %app, "app marked connected");
        Ok(connected)
    }

    #[instrument(skip(self))]
    pub async fn deactivate(&self, user_id: &str, app: AppId) -> StoreResult<bool> {
        let user_id = user_id.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let updated = conn.execute(
                    "UPDATE connected_apps SET is_active = 0, updated_at = ?3 \
                     WHERE user_id = ?1 AND app_type = ?2",
                    rusqlite::params![user_id, app.as_str(), now],
                )?;
                Ok(updated > 0)
            })
            .await
    }

    /// Active connections for `user_id`, in canonical app order.
    #[instrument(skip(self))]
    pub async fn list_active(&self, user_id: &str) -> StoreResult<Vec<ConnectedApp>> {
        let user_id = user_id.to_string();
        let mut apps = self
            .db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, app_type, is_active, created_at, updated_at \
                     FROM connected_apps WHERE user_id = ?1 AND is_active = 1",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![user_id], ConnectionRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter().map(ConnectionRow::into_connected).collect::<StoreResult<Vec<_>>>()
            })
            .await?;
        apps.sort_by_key(|c| c.app);
        Ok(apps)
    }
}

#[async_trait]
impl ConnectionRepository for ConnectionStore {
    async fn list_active(&self, user_id: &str) -> RepoResult<Vec<ConnectedApp>> {
        Ok(ConnectionStore::list_active(self, user_id).await?)
    }

    async fn mark_connected(&self, user_id: &str, app: AppId) -> RepoResult<ConnectedApp> {
        Ok(ConnectionStore::mark_connected(self, user_id, app).await?)
    }

    async fn deactivate(&self, user_id: &str, app: AppId) -> RepoResult<bool> {
        Ok(ConnectionStore::deactivate(self, user_id, app).await?)
    }
}

struct ConnectionRow {
    user_id: String,
    app_type: String,
    is_active: bool,
    created_at: i64,
    updated_at: i64,
}

impl ConnectionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            app_type: row.get(1)?,
            is_active: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_connected(self) -> StoreResult<ConnectedApp> {
        let id = format!("{}/{}", self.user_id, self.app_type);
        let corrupt = |reason: &str| StoreError::Corrupt {
            entity: "connected_app",
            id: id.clone(),
            reason: reason.to_string(),
        };
        let app = AppId::parse(&self.app_type).ok_or_else(|| corrupt("unknown app_type"))?;
        Ok(ConnectedApp {
            user_id: self.user_id,
            app,
            is_active: self.is_active,
            created_at: timestamp(self.created_at).ok_or_else(|| corrupt("bad created_at"))?,
            updated_at: timestamp(self.updated_at).ok_or_else(|| corrupt("bad updated_at"))?,
        })
    }
}

fn fetch(
    conn: &rusqlite::Connection,
    user_id: &str,
    app: AppId,
) -> StoreResult<Option<ConnectedApp>> {
    conn.query_row(
        "SELECT user_id, app_type, is_active, created_at, updated_at \
         FROM connected_apps WHERE user_id = ?1 AND app_type = ?2",
        rusqlite::params![user_id, app.as_str()],
        ConnectionRow::from_row,
    )
    .optional()?
    .map(ConnectionRow::into_connected)
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> ConnectionStore {
        ConnectionStore::new(Database::in_memory_migrated().await.unwrap())
    }

    #[tokio::test]
    async fn reconnecting_reactivates_single_row() {
        let store = store().await;
        store.mark_connected("u", AppId::Gmail).await.unwrap();
        assert!(store.deactivate("u", AppId::Gmail).await.unwrap());
        assert!(store.list_active("u").await.unwrap().is_empty());

        let again = store.mark_connected("u", AppId::Gmail).await.unwrap();
        assert!(again.is_active);

        let rows: i64 = store
            .db
            .execute(|conn| {
                Ok(conn.query_row("SELECT count(*) FROM connected_apps", [], |r| r.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn list_is_per_user_and_ordered() {
        let store = store().await;
        store.mark_connected("u", AppId::Slack).await.unwrap();
        store.mark_connected("u", AppId::Gmail).await.unwrap();
        store.mark_connected("other", AppId::Notion).await.unwrap();

        let apps: Vec<AppId> = store
            .list_active("u")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.app)
            .collect();
        assert_eq!(apps, vec![AppId::Gmail, AppId::Slack]);
    }

    #[tokio::test]
    async fn deactivating_unknown_is_false() {
        let store = store().await;
        assert!(!store.deactivate("u", AppId::Trello).await.unwrap());
    }
}
