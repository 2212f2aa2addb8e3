//! Execution coordination for Blimp.
//!
//! - [`ExecutionCoordinator`] runs a resolved workflow through the
//!   credential gate, the capability registry and the selected handler,
//!   persisting each status transition.
//! - [`BlimpService`] is the facade the CLI (or any outer surface) talks to:
//!   resolve, execute, list, connect and disconnect.

pub mod coordinator;
pub mod error;
pub mod service;

pub use coordinator::{CoordinatorConfig, ExecutionCoordinator, ExecutionResult};
pub use error::{EngineError, Result};
pub use service::{
    BlimpService, ConnectedAppList, ExecuteResponse, ExecutionHistory, Repositories,
    ResolveResponse, ServiceConfig, WorkflowList, WorkflowSummary,
};
