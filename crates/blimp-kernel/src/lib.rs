//! Blimp domain core.
//!
//! Shared vocabulary for the resolver, the execution coordinator, and the
//! storage backends:
//!
//! - **[`app`]** -- Application identifiers and order-independent
//!   capability keys.
//! - **[`credential`]** -- Typed per-application credential material and
//!   connection records.
//! - **[`workflow`]** -- Shared templates and per-user workflow definitions.
//! - **[`execution`]** -- Execution records and the status state machine.
//! - **[`operation`]** -- Keyword predicates and ordered operation selection
//!   (aho-corasick).
//! - **[`handler`]** -- The [`CapabilityHandler`] trait and [`HandlerError`].
//! - **[`registry`]** -- Immutable capability-key → handler table.
//! - **[`repository`]** -- Async persistence traits.
//! - **[`memory`]** -- [`DashMap`](dashmap::DashMap)-backed repository
//!   implementations.
//! - **[`error`]** -- Kernel and repository error types via [`thiserror`].

pub mod app;
pub mod credential;
pub mod error;
pub mod execution;
pub mod handler;
pub mod memory;
pub mod operation;
pub mod registry;
pub mod repository;
pub mod workflow;

// Re-export the most commonly used types at the crate root for convenience.
pub use app::{AppId, CapabilityKey};
pub use credential::{AppCredential, ConnectedApp, CredentialSet, OAuthToken, StoredCredential};
pub use error::{KernelError, RepoResult, RepositoryError, Result};
pub use execution::{ExecutionRecord, ExecutionStatus};
pub use handler::{CapabilityHandler, HandlerError};
pub use memory::{InMemoryConnections, InMemoryCredentials, InMemoryExecutions, InMemoryTemplates};
pub use operation::{KeywordPredicate, OperationSpec, select_operation};
pub use registry::{CapabilityRegistry, CapabilityRegistryBuilder};
pub use repository::{
    ConnectionRepository, CredentialRepository, ExecutionRepository, TemplateRepository,
};
pub use workflow::{DEFAULT_CATEGORY, NewWorkflow, WorkflowDefinition, WorkflowScope};
