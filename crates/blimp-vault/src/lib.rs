//! Encrypted credential vault for Blimp.
//!
//! Stores per-user application credentials encrypted at rest with
//! AES-256-GCM. Each ciphertext is bound to its `(user_id, app)` row.
//!
//! # Modules
//!
//! - [`crypto`] — AES-256-GCM sealing, master key handling, PBKDF2.
//! - [`store`] — SQLite-backed [`Vault`] with upsert semantics.
//! - [`repository`] — async [`CredentialRepository`](blimp_kernel::CredentialRepository)
//!   adapter.
//! - [`error`] — Unified error types.

pub mod crypto;
pub mod error;
pub mod repository;
pub mod store;

pub use crypto::MasterKey;
pub use error::{Result, VaultError};
pub use repository::VaultCredentials;
pub use store::Vault;
