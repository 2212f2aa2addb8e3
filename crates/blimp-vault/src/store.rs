//! SQLite-backed encrypted credential store.
//!
//! One row per `(user_id, app_type)`. The [`AppCredential`] is serialized to
//! JSON, sealed with AES-256-GCM, and stored as `nonce` + `ciphertext`
//! BLOBs. Metadata stays in plaintext so listings never need the key.
//!
//! Storing a credential for a pair that already exists replaces the
//! material in place (`ON CONFLICT ... DO UPDATE`); `created_at` is kept.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use blimp_kernel::{AppCredential, AppId, StoredCredential};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::crypto::{self, MasterKey, Sealed};
use crate::error::{Result, VaultError};

/// Encrypted credential vault backed by SQLite.
///
/// # Example
///
/// ```rust,no_run
/// # use blimp_vault::{MasterKey, Vault};
/// # use blimp_kernel::AppCredential;
/// # fn example() -> blimp_vault::Result<()> {
/// let vault = Vault::open("data/vault.db", MasterKey::generate()?)?;
/// vault.upsert(
///     "user-1",
///     &AppCredential::Slack { bot_token: "xoxb-...".into() },
///     &serde_json::json!({ "team": "acme" }),
/// )?;
/// let cred = vault.get("user-1", blimp_kernel::AppId::Slack)?;
/// # Ok(())
/// # }
/// ```
pub struct Vault {
    conn: Mutex<Connection>,
    key: MasterKey,
}

impl Vault {
    /// Open (or create) a vault database at `path`.
    pub fn open(path: impl AsRef<Path>, key: MasterKey) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "opening vault database");
        Self::init(Connection::open(path)?, key)
    }

    /// Open an in-memory vault (useful for testing).
    pub fn open_in_memory(key: MasterKey) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, key)
    }

    fn init(conn: Connection, key: MasterKey) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS credentials (
                user_id    TEXT NOT NULL,
                app_type   TEXT NOT NULL,
                nonce      BLOB NOT NULL,
                ciphertext BLOB NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, app_type)
            );",
        )
        .map_err(|e| VaultError::MigrationFailed {
            reason: e.to_string(),
        })?;

        tracing::debug!("vault schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
            key,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| VaultError::Internal(format!("mutex poisoned: {e}")))
    }

    // -- Credential CRUD ----------------------------------------------------

    /// Insert or replace the credential for `(user_id, credential.app())`.
    pub fn upsert(
        &self,
        user_id: &str,
        credential: &AppCredential,
        metadata: &serde_json::Value,
    ) -> Result<StoredCredential> {
        let app = credential.app();
        let plaintext = serde_json::to_vec(credential)?;
        let sealed = crypto::seal(&self.key, &plaintext, &associated_data(user_id, app))?;
        let metadata_json = serde_json::to_string(metadata)?;
        let now = Utc::now().timestamp();

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO credentials
                (user_id, app_type, nonce, ciphertext, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(user_id, app_type) DO UPDATE SET
                nonce = excluded.nonce,
                ciphertext = excluded.ciphertext,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            params![
                user_id,
                app.as_str(),
                sealed.nonce.as_slice(),
                sealed.ciphertext,
                metadata_json,
                now
            ],
        )?;

        let created_at: i64 = conn.query_row(
            "SELECT created_at FROM credentials WHERE user_id = ?1 AND app_type = ?2",
            params![user_id, app.as_str()],
            |row| row.get(0),
        )?;

        tracing::info!(user_id = user_id, app = %app, "stored credential");
        Ok(StoredCredential {
            user_id: user_id.to_string(),
            credential: credential.clone(),
            metadata: metadata.clone(),
            created_at: to_datetime(created_at),
            updated_at: to_datetime(now),
        })
    }

    /// Retrieve and decrypt the credential for `(user_id, app)`.
    pub fn get(&self, user_id: &str, app: AppId) -> Result<Option<StoredCredential>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT nonce, ciphertext, metadata, created_at, updated_at
                 FROM credentials WHERE user_id = ?1 AND app_type = ?2",
                params![user_id, app.as_str()],
                |row| {
                    Ok(CredentialRow {
                        nonce: row.get(0)?,
                        ciphertext: row.get(1)?,
                        metadata: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?;

        row.map(|r| self.decrypt_row(user_id, app, r)).transpose()
    }

    /// Apps with a stored credential for `user_id`, in canonical order.
    ///
    /// Does not decrypt anything.
    pub fn list_apps(&self, user_id: &str) -> Result<Vec<AppId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT app_type FROM credentials WHERE user_id = ?1")?;
        let names = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut apps = names
            .into_iter()
            .map(|name| {
                AppId::parse(&name).ok_or_else(|| VaultError::CorruptCredential {
                    user_id: user_id.to_string(),
                    app: name.clone(),
                    reason: "unknown app_type".into(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        apps.sort();
        Ok(apps)
    }

    /// Delete the credential. Returns `false` if there was none.
    pub fn delete(&self, user_id: &str, app: AppId) -> Result<bool> {
        let rows = self.conn()?.execute(
            "DELETE FROM credentials WHERE user_id = ?1 AND app_type = ?2",
            params![user_id, app.as_str()],
        )?;
        if rows > 0 {
            tracing::info!(user_id = user_id, app = %app, "deleted credential");
        }
        Ok(rows > 0)
    }

    fn decrypt_row(
        &self,
        user_id: &str,
        app: AppId,
        row: CredentialRow,
    ) -> Result<StoredCredential> {
        let corrupt = |reason: String| VaultError::CorruptCredential {
            user_id: user_id.to_string(),
            app: app.to_string(),
            reason,
        };

        let sealed = Sealed {
            nonce: crypto::nonce_from_slice(&row.nonce)?,
            ciphertext: row.ciphertext,
        };
        let plaintext = crypto::open(&self.key, &sealed, &associated_data(user_id, app))?;
        let credential: AppCredential =
            serde_json::from_slice(&plaintext).map_err(|e| corrupt(e.to_string()))?;
        if credential.app() != app {
            return Err(corrupt(format!("row holds a {} credential", credential.app())));
        }
        let metadata = serde_json::from_str(&row.metadata).map_err(|e| corrupt(e.to_string()))?;

        Ok(StoredCredential {
            user_id: user_id.to_string(),
            credential,
            metadata,
            created_at: to_datetime(row.created_at),
            updated_at: to_datetime(row.updated_at),
        })
    }
}

struct CredentialRow {
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
    metadata: String,
    created_at: i64,
    updated_at: i64,
}

/// Binds a ciphertext to its row.
fn associated_data(user_id: &str, app: AppId) -> Vec<u8> {
    format!("{user_id}\0{app}").into_bytes()
}

fn to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
