// crates/nysm-harness/src/run.rs
// ============================================================================
// Module: Scenario Runner
// Description: Drives a scenario's setup/flow steps through a real
//              `SyncEngine`, never manufacturing completions from a
//              scenario's `expect` clauses (spec §9's second Open
//              Question).
// Purpose: Give the harness one function that turns a loaded scenario and
//          its spec bundles into a completed flow ready for assertions.
// Dependencies: nysm-engine, nysm-ir, nysm-store
// ============================================================================

//! ## Overview
//! `run_scenario` constructs a [`SyncEngine`] with a [`FixedFlowTokenGenerator`]
//! (spec §4.H: "a fixed flow-token generator returning the scenario's
//! `flow_token` on every call"), `ensure_table`s every bundled concept's
//! state schema, then drives `setup` and `flow` one step at a time through
//! the engine's public `enqueue`/`drain` path — the same path a production
//! caller uses, so a scenario's completions come from `handlers`, never
//! from the scenario document itself.
//!
//! Each step is enqueued and fully drained before the next is enqueued, so
//! a step's own derived sync firings resolve before the next step starts.
//! Because every root invocation here is enqueued with no flow token, the
//! fixed generator assigns this run's single flow token to it, which is why
//! the step that was just driven is always findable by flow-token state
//! alone, without tracking engine-internal ids.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use nysm_engine::EngineError;
use nysm_engine::FlowTokenGenerator;
use nysm_engine::HandlerRegistry;
use nysm_engine::InvocationSpec;
use nysm_engine::SyncEngine;
use nysm_ir::ActionUri;
use nysm_ir::EngineVersion;
use nysm_ir::FlowToken;
use nysm_ir::IrVersion;
use nysm_ir::SpecHash;
use nysm_ir::SyncRule;
use nysm_ir::TypeName;
use nysm_ir::Value;
use nysm_store::ConceptStateStore;
use nysm_store::EventStore;
use nysm_store::FlowEvent;
use sha2::Digest;
use sha2::Sha256;

use crate::error::HarnessError;
use crate::scenario::ActionStep;
use crate::scenario::ExpectClause;
use crate::scenario::FlowStep;
use crate::scenario::Scenario;
use crate::spec_bundle::SpecBundle;

/// The canonical IR version this harness drives scenarios under.
const IR_VERSION: &str = "1";

// ============================================================================
// SECTION: Fixed Flow Token Generator
// ============================================================================

/// Returns the same flow token on every call (spec §4.H).
#[derive(Debug, Clone)]
pub struct FixedFlowTokenGenerator(FlowToken);

impl FixedFlowTokenGenerator {
    /// Creates a generator that always returns `token`.
    #[must_use]
    pub fn new(token: FlowToken) -> Self {
        Self(token)
    }
}

impl FlowTokenGenerator for FixedFlowTokenGenerator {
    fn next_flow_token(&mut self) -> FlowToken {
        self.0.clone()
    }
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// The result of driving a scenario to completion: the flow token every
/// root invocation was minted under, and the flow's trace in replay order.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    /// Flow token the fixed generator assigned.
    pub flow_token: FlowToken,
    /// The flow's events, in replay order.
    pub trace: Vec<FlowEvent>,
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Drives `scenario`'s `setup` then `flow` steps to completion against a
/// fresh [`SyncEngine`] built from `bundles` and `handlers`, over `store`.
///
/// Returns the driven outcome and the engine, so callers can still query
/// concept state tables (e.g. for a `final_state` assertion) through
/// [`SyncEngine::store_mut`].
///
/// # Errors
///
/// Returns [`HarnessError::Engine`] if any step's invocation or a sync
/// firing it triggers fails, [`HarnessError::Store`] if a state-table
/// lookup fails, or [`HarnessError::AssertionFailure`] if a flow step's
/// inline `expect` clause does not hold.
pub fn run_scenario<S>(scenario: &Scenario, bundles: &[SpecBundle], mut store: S, handlers: HandlerRegistry) -> Result<(ScenarioOutcome, SyncEngine<S>), HarnessError>
where
    S: EventStore + ConceptStateStore,
{
    for bundle in bundles {
        let columns: Vec<(String, TypeName)> = bundle.concept.state_schema.iter().filter_map(|field| TypeName::parse(&field.type_name).map(|type_name| (field.name.clone(), type_name))).collect();
        store.ensure_table(&bundle.concept.name.to_lowercase(), &columns)?;
    }

    let flow_token = FlowToken::new(scenario.flow_token.clone().unwrap_or_else(|| format!("scenario:{}", scenario.name)));
    let rules: Vec<SyncRule> = bundles.iter().flat_map(|bundle| bundle.rules.clone()).collect();
    let spec_hash = SpecHash::new(compute_spec_hash(bundles));

    let mut engine = SyncEngine::new(
        store,
        rules,
        handlers,
        Box::new(FixedFlowTokenGenerator::new(flow_token.clone())),
        spec_hash,
        EngineVersion::new(env!("CARGO_PKG_VERSION")),
        IrVersion::new(IR_VERSION),
    )?;

    for step in &scenario.setup {
        drive_action_step(&mut engine, &flow_token, step)?;
    }
    for step in &scenario.flow {
        drive_flow_step(&mut engine, &flow_token, step)?;
    }

    let trace = engine.store_mut().replay_flow(&flow_token)?;
    Ok((
        ScenarioOutcome {
            flow_token,
            trace,
        },
        engine,
    ))
}

/// Enqueues and fully drains one setup step.
fn drive_action_step<S>(engine: &mut SyncEngine<S>, flow_token: &FlowToken, step: &ActionStep) -> Result<(), HarnessError>
where
    S: EventStore + ConceptStateStore,
{
    enqueue_root(engine, flow_token, &step.invoke, step.args.clone())?;
    engine.drain()?;
    Ok(())
}

/// Enqueues and fully drains one flow step, checking its inline `expect`
/// clause against the completion it produced.
fn drive_flow_step<S>(engine: &mut SyncEngine<S>, flow_token: &FlowToken, step: &FlowStep) -> Result<(), HarnessError>
where
    S: EventStore + ConceptStateStore,
{
    let completions_before = engine.store_mut().get_flow_state(flow_token)?.completions.len();
    enqueue_root(engine, flow_token, &step.invoke, step.args.clone())?;
    engine.drain()?;
    if let Some(expect) = &step.expect {
        check_inline_expect(engine, flow_token, step, completions_before, expect)?;
    }
    Ok(())
}

/// Enqueues a root invocation spec for `action_uri`/`args`, inheriting
/// `flow_token` explicitly so the fixed generator's own assignment is
/// redundant rather than load-bearing.
fn enqueue_root<S>(engine: &mut SyncEngine<S>, flow_token: &FlowToken, action_uri: &str, args: Value) -> Result<(), EngineError>
where
    S: EventStore + ConceptStateStore,
{
    let mut spec = InvocationSpec::root(ActionUri::new(action_uri), args);
    spec.flow_token = Some(flow_token.clone());
    engine.enqueue(spec)
}

/// Checks a flow step's inline `expect` clause against the completion this
/// step produced: the first new completion recorded in `flow_token`'s state
/// after `completions_before`, which single-writer FIFO ordering guarantees
/// is this step's own completion (it is enqueued alone, so its tick always
/// runs before any of its own derived invocations' ticks).
fn check_inline_expect<S>(engine: &mut SyncEngine<S>, flow_token: &FlowToken, step: &FlowStep, completions_before: usize, expect: &ExpectClause) -> Result<(), HarnessError>
where
    S: EventStore + ConceptStateStore,
{
    let state = engine.store_mut().get_flow_state(flow_token)?;
    let Some(completion) = state.completions.get(completions_before) else {
        return Err(HarnessError::AssertionFailure(format!("no completion recorded for flow step invoking '{}'", step.invoke)));
    };
    if completion.output_case.as_str() != expect.case {
        return Err(HarnessError::AssertionFailure(format!(
            "flow step invoking '{}' completed with case '{}', expected '{}'",
            step.invoke,
            completion.output_case,
            expect.case
        )));
    }
    if let Some(expected_result) = &expect.result {
        let Some(expected_fields) = expected_result.as_object() else {
            return Err(HarnessError::AssertionFailure(format!("flow step invoking '{}': expect.result must be an object", step.invoke)));
        };
        let Some(actual_fields) = completion.result.as_object() else {
            return Err(HarnessError::AssertionFailure(format!("flow step invoking '{}': completion result is not an object", step.invoke)));
        };
        let missing: BTreeSet<&String> = expected_fields.keys().filter(|key| actual_fields.get(key.as_str()) != expected_fields.get(key.as_str())).collect();
        if !missing.is_empty() {
            return Err(HarnessError::AssertionFailure(format!("flow step invoking '{}': result fields {missing:?} did not match expect.result", step.invoke)));
        }
    }
    Ok(())
}

/// Computes a stable hash over a scenario's bundled concept specs and sync
/// rules, stamped as every driven invocation's `spec_hash`. Spec.md leaves
/// `spec_hash`'s derivation to whoever constructs the engine (it is opaque
/// provenance metadata, not a value the engine itself interprets), so this
/// is the harness's own convention rather than a canonical-IR computation.
fn compute_spec_hash(bundles: &[SpecBundle]) -> String {
    let mut hasher = Sha256::new();
    for bundle in bundles {
        if let Ok(bytes) = serde_json::to_vec(&bundle.concept) {
            hasher.update(bytes);
        }
        for rule in &bundle.rules {
            if let Ok(bytes) = serde_json::to_vec(rule) {
                hasher.update(bytes);
            }
        }
    }
    format!("{:x}", hasher.finalize())
}
