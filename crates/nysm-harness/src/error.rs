// crates/nysm-harness/src/error.rs
// ============================================================================
// Module: Harness Errors
// Description: The conformance harness's error taxonomy (spec §7).
// Purpose: Distinguish a malformed scenario from a failed assertion from a
//          genuine non-determinism, since the CLI maps each to a different
//          exit code and error envelope.
// Dependencies: nysm-engine, nysm-store, thiserror
// ============================================================================

//! ## Overview
//! `InputRejection` covers everything wrong with a scenario document before
//! it ever reaches the engine: malformed YAML, an unknown top-level field,
//! a missing spec-bundle file, an empty `final_state` `expect` map (spec
//! §9's first Open Question, resolved at load time, not evaluation time).
//! Everything the engine itself raises bubbles through [`HarnessError::Engine`]
//! unchanged; only a locally recovered `HandlerError` never reaches here,
//! since the engine writes it as an ordinary completion (spec §7).

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use nysm_engine::EngineError;
use nysm_store::StoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading or running a conformance scenario.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The scenario document, or a spec bundle it references, was malformed:
    /// bad YAML/JSON, an unknown field, or a violated loader-time invariant.
    #[error("input rejected: {0}")]
    InputRejection(String),
    /// The event store or sync engine raised an error while driving the
    /// scenario's setup/flow steps.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    /// The store raised an error outside the engine's own driving loop (e.g.
    /// while a `final_state` assertion lists rows).
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// A declared assertion, or a flow step's inline `expect` clause, did
    /// not hold.
    #[error("assertion failed: {0}")]
    AssertionFailure(String),
    /// A golden snapshot comparison found the replayed trace diverged from
    /// a previously recorded run.
    #[error("determinism failure: {0}")]
    DeterminismFailure(String),
}
