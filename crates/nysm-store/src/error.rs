// crates/nysm-store/src/error.rs
// ============================================================================
// Module: Store Errors
// Description: The event store's error taxonomy.
// Purpose: Surface `StoreError` (spec §7) as a fatal, bubbled-up condition.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every [`StoreError`] is fatal to the current tick: the engine aborts,
//! leaves the store untouched, and surfaces the error upward (spec §4.G
//! "Failure semantics"). Constraint violations other than the intentional
//! idempotency constraints (duplicate `id`, duplicate `(completion_id,
//! sync_id, binding_hash)`) fall here too.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by an [`crate::EventStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure (disk, connection, etc.).
    #[error("store io error: {0}")]
    Io(String),
    /// A write referenced a record that does not exist (e.g. a completion
    /// naming an unknown invocation).
    #[error("store referential integrity violation: {0}")]
    DanglingReference(String),
    /// A write's `seq` collides with one already recorded in this store.
    #[error("store ordering violation: seq {seq} has already been recorded in this store")]
    SeqAlreadyUsed {
        /// The offending `seq`.
        seq: i64,
    },
    /// The on-disk schema version did not match what this store expects.
    #[error("store schema version mismatch: {0}")]
    SchemaMismatch(String),
    /// A query produced through `nysm_query::compile` could not be
    /// executed against this backend.
    #[error("store query error: {0}")]
    Query(String),
}
