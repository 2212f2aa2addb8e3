//! # blimp-store
//!
//! SQLite persistence for Blimp.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  TemplateStore    (templates + user workflows) │
//! │  ConnectionStore  (connected apps)             │
//! │  ExecutionStore   (execution records, CAS)     │
//! ├──────────────────────────────────────────────┤
//! │  Database   (rusqlite WAL, spawn_blocking)     │
//! │  Migrations (versioned, transactional)         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Each store implements the matching repository trait from
//! [`blimp_kernel::repository`], so the engine never sees SQLite types.
//!
//! ## Quick start
//!
//! ```ignore
//! use blimp_store::{Database, TemplateStore, ExecutionStore};
//!
//! let db = Database::open_and_migrate("data/blimp.db").await?;
//! let templates = TemplateStore::new(db.clone());
//! let executions = ExecutionStore::new(db);
//! ```

pub mod connection_store;
pub mod db;
pub mod error;
pub mod execution_store;
pub mod migration;
pub mod template_store;

// ── re-exports ───────────────────────────────────────────────────────

pub use connection_store::ConnectionStore;
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use execution_store::ExecutionStore;
pub use template_store::TemplateStore;
