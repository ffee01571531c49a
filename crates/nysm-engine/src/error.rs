// crates/nysm-engine/src/error.rs
// ============================================================================
// Module: Engine Errors
// Description: The sync engine's error taxonomy.
// Purpose: Distinguish fatal store failures from recovered handler errors.
// Dependencies: nysm-query, nysm-store, thiserror
// ============================================================================

//! ## Overview
//! Only [`EngineError::Store`] aborts a tick (spec §4.G "Failure
//! semantics"). A handler's own declared error variant is never wrapped
//! here: it is written as an ordinary completion by the caller before this
//! error type would ever be consulted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nysm_query::SqlError;
use nysm_store::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while driving the event loop.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The store rejected a read or write; the current tick is abandoned.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A where-clause failed to lower to SQL (unbound variable, bad
    /// identifier, non-scalar value).
    #[error(transparent)]
    Sql(#[from] SqlError),
    /// `enqueue` or a then-clause referenced an action URI no registered
    /// handler resolves.
    #[error("no handler registered for action: {0}")]
    UnknownAction(String),
    /// A then-clause's `ArgExpr::Var` referenced a name absent from the
    /// firing's binding row. Sync-rule validation should prevent this; it
    /// is defensively checked here too.
    #[error("binding row has no value for variable: {0}")]
    UnboundVariable(String),
    /// A `Scope::Keyed` rule's binding row had no value for its declared
    /// key variable.
    #[error("keyed scope for sync rule {0} has no scope key configured")]
    MissingScopeKey(String),
    /// The event loop's mailbox receiver has disconnected from every
    /// sender, which cannot happen while the engine itself holds a sender.
    #[error("invocation mailbox is closed")]
    MailboxClosed,
}
