// crates/nysm-harness/src/lib.rs
// ============================================================================
// Module: NYSM Conformance Harness
// Description: Public API surface for loading, driving, and checking
//              declarative conformance scenarios (spec §4.H).
// Purpose: Give the CLI's `test` subcommand, and any integration test, one
//          entry point that turns a scenario file and its spec bundles into
//          a pass/fail verdict against assertions and a golden snapshot.
// Dependencies: crate::{assertions, error, run, scenario, snapshot, spec_bundle}
// ============================================================================

//! ## Overview
//! A conformance scenario names the concept specs and sync rules it
//! exercises, a sequence of setup and flow invocations, and a set of
//! assertions over the resulting trace and concept state. The harness
//! drives every invocation through a real [`nysm_engine::SyncEngine`] over
//! registered action handlers — it never fabricates a completion from a
//! scenario's `expect` clause (spec §9's second Open Question) — then
//! checks assertions and, optionally, a byte-exact golden trace snapshot.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod assertions;
pub mod error;
pub mod run;
pub mod scenario;
pub mod snapshot;
pub mod spec_bundle;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use assertions::evaluate_assertions;
pub use error::HarnessError;
pub use run::FixedFlowTokenGenerator;
pub use run::ScenarioOutcome;
pub use run::run_scenario;
pub use scenario::ActionStep;
pub use scenario::Assertion;
pub use scenario::ExpectClause;
pub use scenario::FlowStep;
pub use scenario::Scenario;
pub use scenario::load_scenario;
pub use snapshot::build_snapshot;
pub use snapshot::compare_snapshot;
pub use snapshot::write_snapshot;
pub use spec_bundle::SpecBundle;
pub use spec_bundle::load_spec_bundles;
