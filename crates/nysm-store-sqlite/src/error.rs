// crates/nysm-store-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Store Errors
// Description: SQLite-specific error taxonomy and its mapping onto the
//              backend-agnostic `nysm_store::StoreError`.
// Purpose: Keep rusqlite's error type out of callers that only care about
//          the event store contract.
// Dependencies: nysm-store, rusqlite, thiserror
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use nysm_store::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` event store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error (opening the database file, filesystem failure).
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Schema version mismatch between the database file and this binary.
    #[error("sqlite store schema version mismatch: {0}")]
    SchemaMismatch(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Io(message),
            SqliteStoreError::SchemaMismatch(message) => Self::SchemaMismatch(message),
        }
    }
}
