// crates/nysm-store/src/contract.rs
// ============================================================================
// Module: Event Store Contract
// Description: The `EventStore` trait (spec §4.F).
// Purpose: Define the backend-agnostic append-only log interface every
//          store implementation (in-memory, SQLite, ...) must satisfy.
// Dependencies: crate::{error, event}, nysm-ir, nysm-query
// ============================================================================

//! ## Overview
//! `EventStore` exposes five logical tables through a strict operation set.
//! Implementations must be deterministic and fail closed: a `StoreError` is
//! always fatal to the caller's current tick.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use nysm_ir::BindingHash;
use nysm_ir::Completion;
use nysm_ir::CompletionId;
use nysm_ir::FlowToken;
use nysm_ir::Invocation;
use nysm_ir::InvocationId;
use nysm_ir::SyncFiring;
use nysm_ir::SyncRuleId;
use nysm_ir::Value;

use crate::error::StoreError;
use crate::event::FlowEvent;

// ============================================================================
// SECTION: Row / Query Result
// ============================================================================

/// A single result row from [`EventStore::query`]: column name to value.
pub type Row = BTreeMap<String, Value>;

// ============================================================================
// SECTION: Flow State
// ============================================================================

/// The full observable state of one flow (spec §4.F `get_flow_state`).
#[derive(Debug, Clone, PartialEq)]
pub struct FlowState {
    /// All invocations written under this flow token, in `seq` order.
    pub invocations: Vec<Invocation>,
    /// All completions written under this flow token, in `seq` order.
    pub completions: Vec<Completion>,
    /// Sync firings recorded against completions in this flow.
    pub sync_firings: Vec<SyncFiring>,
    /// Whether every invocation in this flow has a matching completion and
    /// no pending derived invocation remains enqueued.
    pub is_complete: bool,
}

// ============================================================================
// SECTION: EventStore
// ============================================================================

/// The append-only event log contract (spec §4.F).
pub trait EventStore {
    /// Inserts `invocation` if its `id` is new; otherwise a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SeqAlreadyUsed`] if `seq` has already been
    /// recorded by another invocation, completion, or sync firing in this
    /// store, or [`StoreError::Io`] on a backend failure.
    fn write_invocation(&mut self, invocation: &Invocation) -> Result<(), StoreError>;

    /// Inserts `completion` if its `id` is new; otherwise a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DanglingReference`] if `invocation_id` is
    /// unknown, [`StoreError::SeqAlreadyUsed`] if `seq` has already been
    /// recorded elsewhere in this store, or [`StoreError::Io`] on a backend
    /// failure.
    fn write_completion(&mut self, completion: &Completion) -> Result<(), StoreError>;

    /// Atomic insert-if-absent on `(completion_id, sync_id, binding_hash)`.
    /// Returns the new firing's store-internal surrogate id if this call
    /// performed the insert, or `None` if the key was already present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on a backend failure.
    fn try_fire(
        &mut self,
        completion_id: &CompletionId,
        sync_id: &SyncRuleId,
        binding_hash: &BindingHash,
        seq: i64,
    ) -> Result<Option<i64>, StoreError>;

    /// Records a provenance edge from a sync firing to the invocation it
    /// derived. `sync_firing_id` is the store-internal surrogate key
    /// returned by the preceding `try_fire`'s insert, not exposed further.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on a backend failure.
    fn add_provenance(&mut self, sync_firing_id: i64, invocation_id: &InvocationId) -> Result<(), StoreError>;

    /// Lists every flow token with at least one written invocation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on a backend failure.
    fn list_flow_tokens(&self) -> Result<Vec<FlowToken>, StoreError>;

    /// Replays a flow's events in strictly increasing `seq` order, with a
    /// deterministic `(type, id)` tiebreak for any colliding `seq`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on a backend failure.
    fn replay_flow(&self, flow_token: &FlowToken) -> Result<Vec<FlowEvent>, StoreError>;

    /// Returns the full observable state of one flow.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on a backend failure.
    fn get_flow_state(&self, flow_token: &FlowToken) -> Result<FlowState, StoreError>;

    /// Executes a parameterized query produced by `nysm_query::compile`.
    /// Implementations must enforce the `COLLATE BINARY` ordering contract.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the SQL cannot be executed against
    /// this backend, or [`StoreError::Io`] on a backend failure.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;
}
