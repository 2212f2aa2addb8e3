//! [`CredentialRepository`] over the synchronous [`Vault`].
//!
//! Vault calls do SQLite I/O and AES-GCM work, so they run on tokio's
//! blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use blimp_kernel::{AppCredential, AppId, CredentialRepository, RepoResult, StoredCredential};

use crate::error::Result;
use crate::store::Vault;

/// Cloneable async handle to a shared [`Vault`].
#[derive(Clone)]
pub struct VaultCredentials {
    vault: Arc<Vault>,
}

impl VaultCredentials {
    pub fn new(vault: Vault) -> Self {
        Self {
            vault: Arc::new(vault),
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Vault) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let vault = Arc::clone(&self.vault);
        tokio::task::spawn_blocking(move || f(&vault)).await?
    }
}

#[async_trait]
impl CredentialRepository for VaultCredentials {
    async fn upsert(
        &self,
        user_id: &str,
        credential: AppCredential,
        metadata: serde_json::Value,
    ) -> RepoResult<StoredCredential> {
        let user_id = user_id.to_string();
        Ok(self
            .blocking(move |v| v.upsert(&user_id, &credential, &metadata))
            .await?)
    }

    async fn get(&self, user_id: &str, app: AppId) -> RepoResult<Option<StoredCredential>> {
        let user_id = user_id.to_string();
        Ok(self.blocking(move |v| v.get(&user_id, app)).await?)
    }

    async fn list_apps(&self, user_id: &str) -> RepoResult<Vec<AppId>> {
        let user_id = user_id.to_string();
        Ok(self.blocking(move |v| v.list_apps(&user_id)).await?)
    }

    async fn delete(&self, user_id: &str, app: AppId) -> RepoResult<bool> {
        let user_id = user_id.to_string();
        Ok(self.blocking(move |v| v.delete(&user_id, app)).await?)
    }
}
