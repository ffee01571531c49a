// crates/nysm-engine/src/handler.rs
// ============================================================================
// Module: Action Handler Registry
// Description: The `action_uri -> handler` resolution table.
// Purpose: Let callers register the pure functions a concept's actions
//          invoke, keyed by their fully qualified URI.
// Dependencies: nysm-ir, nysm-store
// ============================================================================

//! ## Overview
//! Registration mirrors a composite dispatcher keying handlers by a
//! string scheme: a `BTreeMap<String, Arc<dyn ActionHandler>>` resolved
//! once per completion. The registry is treated as immutable once `run`
//! starts (spec §5 "Shared resources").

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use nysm_ir::OutputCase;
use nysm_ir::Value;
use nysm_store::ConceptStateStore;
use nysm_store::StoreError;

// ============================================================================
// SECTION: ActionHandler
// ============================================================================

/// A pure function mapping an invocation's arguments to an output case and
/// result, with read/write access to concept state tables.
///
/// Implementations must be pure with respect to `args` and the store's
/// readable state: side effects outside the store are forbidden for
/// determinism (spec §4.G step 4).
pub trait ActionHandler: Send + Sync {
    /// Executes the action against `args`, reading and writing concept
    /// state through `state`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a concept-state read or write fails. A
    /// business-logic failure is not an `Err` here: it is expressed as an
    /// `(output_case, result)` pair naming the handler's own declared
    /// error variant (spec §4.G "Failure semantics").
    fn invoke(&self, args: &Value, state: &mut dyn ConceptStateStore) -> Result<(OutputCase, Value), StoreError>;
}

impl<F> ActionHandler for F
where
    F: Fn(&Value, &mut dyn ConceptStateStore) -> Result<(OutputCase, Value), StoreError> + Send + Sync,
{
    fn invoke(&self, args: &Value, state: &mut dyn ConceptStateStore) -> Result<(OutputCase, Value), StoreError> {
        self(args, state)
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// A registry of action handlers, keyed by fully qualified action URI
/// (e.g. `"Cart.checkout"`).
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    /// Registered handlers, keyed by action URI.
    handlers: BTreeMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `action_uri`, replacing any prior
    /// registration for the same URI.
    #[must_use]
    pub fn register(mut self, action_uri: impl Into<String>, handler: impl ActionHandler + 'static) -> Self {
        self.handlers.insert(action_uri.into(), Arc::new(handler));
        self
    }

    /// Looks up the handler registered for `action_uri`.
    #[must_use]
    pub fn get(&self, action_uri: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action_uri).cloned()
    }
}
