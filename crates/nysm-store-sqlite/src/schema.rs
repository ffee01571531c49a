// crates/nysm-store-sqlite/src/schema.rs
// ============================================================================
// Module: SQLite Schema
// Description: Fixed log tables plus dynamic concept-state table creation.
// Purpose: Implement the on-disk log schema from spec §6.
// Dependencies: crate::error, nysm-ir, rusqlite
// ============================================================================

//! ## Overview
//! The four log tables (`invocations`, `completions`, `sync_firings`,
//! `provenance_edges`) are fixed at connection-open time. Concept state
//! tables are created lazily, one per declared state schema, with real
//! typed columns so `nysm_query::sql::compile`'s output executes against
//! them unmodified.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nysm_ir::TypeName;
use rusqlite::Connection;
use rusqlite::params;

use crate::error::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version for the fixed log tables.
pub const SCHEMA_VERSION: i64 = 1;

// ============================================================================
// SECTION: Fixed Schema
// ============================================================================

/// Creates the fixed log tables if absent, or validates the existing
/// schema version.
pub fn initialize(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .ok();
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS invocations (
                    id TEXT PRIMARY KEY,
                    flow_token TEXT NOT NULL,
                    action_uri TEXT NOT NULL,
                    args BLOB NOT NULL,
                    seq INTEGER NOT NULL,
                    security_context BLOB NOT NULL,
                    spec_hash TEXT NOT NULL,
                    engine_version TEXT NOT NULL,
                    ir_version TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_invocations_flow_token ON invocations (flow_token);
                CREATE TABLE IF NOT EXISTS completions (
                    id TEXT PRIMARY KEY,
                    invocation_id TEXT NOT NULL REFERENCES invocations(id),
                    output_case TEXT NOT NULL,
                    result BLOB NOT NULL,
                    seq INTEGER NOT NULL,
                    security_context BLOB NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_completions_invocation_id ON completions (invocation_id);
                CREATE TABLE IF NOT EXISTS sync_firings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    completion_id TEXT NOT NULL REFERENCES completions(id),
                    sync_id TEXT NOT NULL,
                    binding_hash TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    UNIQUE(completion_id, sync_id, binding_hash)
                );
                CREATE TABLE IF NOT EXISTS provenance_edges (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    sync_firing_id INTEGER NOT NULL REFERENCES sync_firings(id),
                    invocation_id TEXT NOT NULL REFERENCES invocations(id)
                );",
            )?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::SchemaMismatch(format!("unsupported schema version: {value}")));
        }
    }
    tx.commit()?;
    Ok(())
}

// ============================================================================
// SECTION: Concept State Tables
// ============================================================================

/// Maps an allow-listed type name to its `SQLite` column affinity.
#[must_use]
pub fn sql_column_type(type_name: TypeName) -> &'static str {
    match type_name {
        TypeName::String | TypeName::Array | TypeName::Object => "TEXT",
        TypeName::Int => "INTEGER",
        TypeName::Bool => "INTEGER",
    }
}

/// Validates a table or column identifier against the same allow-list the
/// SQL lowering pass enforces (spec §4.E).
pub fn validate_identifier(name: &str) -> Result<(), SqliteStoreError> {
    let mut chars = name.chars();
    let is_valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_') && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if is_valid {
        Ok(())
    } else {
        Err(SqliteStoreError::Db(format!("invalid identifier: {name}")))
    }
}

/// Creates `table` with an `id TEXT PRIMARY KEY` column plus one column per
/// `(name, type)` pair, if it does not already exist.
pub fn ensure_concept_table(connection: &Connection, table: &str, columns: &[(String, TypeName)]) -> Result<(), SqliteStoreError> {
    validate_identifier(table)?;
    let mut column_defs = String::from("id TEXT PRIMARY KEY");
    for (name, type_name) in columns {
        validate_identifier(name)?;
        if name == "id" {
            continue;
        }
        column_defs.push_str(&format!(", {name} {}", sql_column_type(*type_name)));
    }
    connection.execute_batch(&format!("CREATE TABLE IF NOT EXISTS {table} ({column_defs});"))?;
    Ok(())
}
