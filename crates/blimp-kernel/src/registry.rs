//! Capability registry.
//!
//! Maps a [`CapabilityKey`] to the single handler serving that set of
//! applications. Handlers are registered on a [`CapabilityRegistryBuilder`]
//! during startup; [`CapabilityRegistryBuilder::build`] freezes the table
//! and the resulting [`CapabilityRegistry`] is read-only.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = CapabilityRegistry::builder()
//!     .register_handler(Arc::new(GmailCalendarHandler::new(gmail, calendar)))?
//!     .build();
//! let handler = registry.lookup(&workflow.required_apps)?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::app::CapabilityKey;
use crate::error::{KernelError, Result};
use crate::handler::CapabilityHandler;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Accumulates handlers before the registry is frozen.
#[derive(Default)]
pub struct CapabilityRegistryBuilder {
    handlers: HashMap<CapabilityKey, Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistryBuilder {
    /// Register `handler` under `key`.
    ///
    /// # Errors
    ///
    /// - [`KernelError::DuplicateCapability`] if `key` is already taken.
    /// - [`KernelError::CapabilityMismatch`] if the handler serves a
    ///   different set of applications than `key`.
    /// - [`KernelError::NoOperations`] if the handler declares no operations.
    pub fn register(
        mut self,
        key: CapabilityKey,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Result<Self> {
        let served = handler.capability();
        if served != key {
            return Err(KernelError::CapabilityMismatch {
                expected: key.to_string(),
                actual: served.to_string(),
            });
        }
        if handler.operations().is_empty() {
            return Err(KernelError::NoOperations {
                capability: key.to_string(),
            });
        }
        if self.handlers.contains_key(&key) {
            return Err(KernelError::DuplicateCapability {
                capability: key.to_string(),
            });
        }

        tracing::info!(
            capability = %key,
            operations = handler.operations().len(),
            "capability handler registered"
        );
        self.handlers.insert(key, handler);
        Ok(self)
    }

    /// Register `handler` under the key it reports serving.
    pub fn register_handler(self, handler: Arc<dyn CapabilityHandler>) -> Result<Self> {
        let key = handler.capability();
        self.register(key, handler)
    }

    /// Freeze the table.
    pub fn build(self) -> CapabilityRegistry {
        tracing::info!(handlers = self.handlers.len(), "capability registry built");
        CapabilityRegistry {
            handlers: self.handlers,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable capability-key → handler table.
pub struct CapabilityRegistry {
    handlers: HashMap<CapabilityKey, Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistry {
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder::default()
    }

    /// A registry with no handlers.
    pub fn empty() -> Self {
        Self::builder().build()
    }

    /// Find the handler for exactly `key`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NoHandler`] when nothing serves `key`.
    pub fn lookup(&self, key: &CapabilityKey) -> Result<Arc<dyn CapabilityHandler>> {
        let found = self.handlers.get(key).cloned();
        tracing::debug!(capability = %key, found = found.is_some(), "capability lookup");
        found.ok_or_else(|| KernelError::NoHandler {
            capability: key.to_string(),
        })
    }

    pub fn contains(&self, key: &CapabilityKey) -> bool {
        self.handlers.contains_key(key)
    }

    /// Registered keys in canonical order.
    pub fn keys(&self) -> Vec<CapabilityKey> {
        let mut keys: Vec<CapabilityKey> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.keys().iter().map(ToString::to_string).collect();
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &keys)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
