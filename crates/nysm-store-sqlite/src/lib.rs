// crates/nysm-store-sqlite/src/lib.rs
// ============================================================================
// Module: NYSM SQLite Store
// Description: Public API surface for the SQLite-backed reference store.
// Purpose: Expose a durable EventStore/ConceptStateStore implementation.
// Dependencies: crate::{config, error, schema, store}
// ============================================================================

//! ## Overview
//! `nysm-store-sqlite` is a reference `EventStore`/`ConceptStateStore`
//! implementation backed by a single `SQLite` database file in WAL mode. It
//! exists alongside `nysm-store`'s in-memory implementation so the engine
//! and test harness can run against either without code changes.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod config;
mod error;
mod schema;
mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::SqliteStoreMode;
pub use config::SqliteStoreConfig;
pub use config::SqliteSyncMode;
pub use error::SqliteStoreError;
pub use schema::SCHEMA_VERSION;
pub use store::SqliteEventStore;
