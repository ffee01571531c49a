// crates/nysm-store/src/state.rs
// ============================================================================
// Module: Concept State Store
// Description: CRUD access to the per-concept state tables named in spec §6.
// Purpose: Give handlers a place to read and write domain rows (inventory
//          levels, cart contents, ...) independent of the event log proper.
// Dependencies: crate::{contract, error}, nysm-ir
// ============================================================================

//! ## Overview
//! Spec §4.F lists `write_invocation`/`write_completion`/`try_fire`/
//! `add_provenance`/`list_flow_tokens`/`replay_flow`/`get_flow_state`/
//! `query` as the event log's operation set, and separately notes that
//! "concept state tables" exist "one per declared state schema" (§6), with
//! "column names derived from the schema". The spec names neither an
//! operation set for writing to those tables nor for declaring their
//! columns up front — handlers need the former to implement actions like
//! `Inventory.reserve`, and a SQL-backed store needs the latter to create
//! real typed columns. This trait is that operation set, kept apart from
//! [`crate::EventStore`] so the log's append-only contract stays exactly
//! what spec §4.F describes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nysm_ir::TypeName;

use crate::contract::Row;
use crate::error::StoreError;

// ============================================================================
// SECTION: ConceptStateStore
// ============================================================================

/// CRUD access to concept state tables.
pub trait ConceptStateStore {
    /// Declares `table`'s columns ahead of first use, mapping each
    /// `(name, TypeName)` pair per spec §4.E's value mapping table. Called
    /// once per concept when its spec is registered; idempotent on a table
    /// that already has this exact shape.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on a backend failure, or
    /// [`StoreError::SchemaMismatch`] if `table` already exists with a
    /// different column set.
    fn ensure_table(&mut self, table: &str, columns: &[(String, TypeName)]) -> Result<(), StoreError>;

    /// Inserts or replaces the row in `table` whose `id` column equals
    /// `row`'s `id` column.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on a backend failure, or
    /// [`StoreError::Query`] if `row` has no `id` column.
    fn upsert_row(&mut self, table: &str, row: Row) -> Result<(), StoreError>;

    /// Returns every row currently stored in `table`, in unspecified order
    /// (callers needing determinism should go through
    /// [`crate::EventStore::query`]).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on a backend failure.
    fn list_rows(&self, table: &str) -> Result<Vec<Row>, StoreError>;
}
