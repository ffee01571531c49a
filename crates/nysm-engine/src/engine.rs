// crates/nysm-engine/src/engine.rs
// ============================================================================
// Module: Sync Engine
// Description: The single-writer event loop driving invocations, completions,
//              and sync-rule matching (spec §4.G, §5).
// Purpose: Tie the mailbox, clock, handler registry, and store together into
//          the one component that actually runs a flow.
// Dependencies: crate::{bindings, clock, error, handler, mailbox}, nysm-ir,
//               nysm-query, nysm-store
// ============================================================================

//! ## Overview
//! `SyncEngine` mirrors the reference project's `ControlPlane`: a generic
//! struct over a store implementation, one linear "load, mutate, write" flow
//! per operation, and a single aggregated error type. Unlike `ControlPlane`,
//! this loop also owns the cross-thread mailbox and a private logical clock.
//!
//! One adaptation from the literal spec prose: `try_fire` here returns the
//! new firing's surrogate id (`Option<i64>`) rather than a bare `bool`, so
//! `apply_completion` can satisfy step (c)'s "write a provenance edge from
//! the firing to the new invocation's id" without a second round-trip query.
//! This is recorded in `DESIGN.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use nysm_ir::BindingHash;
use nysm_ir::Completion;
use nysm_ir::CompletionId;
use nysm_ir::EngineVersion;
use nysm_ir::EventType;
use nysm_ir::FlowToken;
use nysm_ir::Invocation;
use nysm_ir::InvocationId;
use nysm_ir::IrVersion;
use nysm_ir::ScopeMode;
use nysm_ir::SpecHash;
use nysm_ir::SyncRule;
use nysm_ir::Value;
use nysm_ir::identity;
use nysm_query::Query;
use nysm_query::Select;
use nysm_query::compile;
use nysm_store::ConceptStateStore;
use nysm_store::EventStore;

use crate::bindings::evaluate_then_args;
use crate::bindings::evaluate_when_bindings;
use crate::bindings::lower_filter;
use crate::clock::LogicalClock;
use crate::error::EngineError;
use crate::handler::HandlerRegistry;
use crate::mailbox::InvocationSpec;
use crate::mailbox::MailboxEvent;
use crate::mailbox::MailboxReceiver;
use crate::mailbox::MailboxSender;
use crate::mailbox::channel;

/// Flow token used for `Scope::Global` firings: a fixed sentinel shared
/// across every flow, per spec §4.G scope semantics.
pub const GLOBAL_SCOPE_TOKEN: &str = "__global__";

/// The interval at which `SyncEngine::run` re-checks its cancellation token
/// between mailbox polls.
const CANCELLATION_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ============================================================================
// SECTION: Flow Token Generation
// ============================================================================

/// Mints fresh flow tokens for root invocations.
///
/// The conformance harness supplies a fixed generator returning the
/// scenario's declared `flow_token` on every call (spec §4.H); production
/// callers use [`SequentialFlowTokenGenerator`] or their own scheme.
pub trait FlowTokenGenerator: Send {
    /// Returns the next flow token to assign to a root invocation.
    fn next_flow_token(&mut self) -> FlowToken;
}

/// Mints flow tokens `flow-1`, `flow-2`, ... in allocation order.
#[derive(Debug, Default)]
pub struct SequentialFlowTokenGenerator {
    /// Counter backing the next minted token's numeric suffix.
    next: u64,
}

impl SequentialFlowTokenGenerator {
    /// Creates a generator that starts at `flow-1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowTokenGenerator for SequentialFlowTokenGenerator {
    fn next_flow_token(&mut self) -> FlowToken {
        self.next += 1;
        FlowToken::new(format!("flow-{next}", next = self.next))
    }
}

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// A cooperative cancellation flag honored at tick boundaries (spec §5).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(
    /// Shared cancellation flag, set from any thread holding a clone.
    Arc<AtomicBool>,
);

impl CancellationToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Takes effect at the next tick boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Sync Engine
// ============================================================================

/// The single-writer event loop (spec §4.G).
pub struct SyncEngine<S> {
    /// The store implementation this engine drives writes and queries
    /// through; also handed to handlers as a [`ConceptStateStore`].
    store: S,
    /// The full set of sync rules matched against every completion.
    rules: Vec<SyncRule>,
    /// The `action_uri -> handler` resolution table.
    handlers: HandlerRegistry,
    /// The loop's private monotonic `seq` counter.
    clock: LogicalClock,
    /// Mints fresh flow tokens for root invocations.
    flow_tokens: Box<dyn FlowTokenGenerator>,
    /// The sending half of the mailbox, cloned out to external producers.
    sender: MailboxSender,
    /// The receiving half of the mailbox; only this loop ever reads it.
    receiver: MailboxReceiver,
    /// Stamped onto every invocation this engine writes.
    spec_hash: SpecHash,
    /// Stamped onto every invocation this engine writes.
    engine_version: EngineVersion,
    /// Stamped onto every invocation this engine writes.
    ir_version: IrVersion,
}

impl<S> SyncEngine<S>
where
    S: EventStore + ConceptStateStore,
{
    /// Builds an engine over `store`, seeding its logical clock from the
    /// highest `seq` already present so a resumed engine never reissues one
    /// a replay would reject (spec §4.G "Replay").
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the store cannot be read.
    pub fn new(
        store: S,
        rules: Vec<SyncRule>,
        handlers: HandlerRegistry,
        flow_tokens: Box<dyn FlowTokenGenerator>,
        spec_hash: SpecHash,
        engine_version: EngineVersion,
        ir_version: IrVersion,
    ) -> Result<Self, EngineError> {
        let seed = highest_existing_seq(&store)?;
        let (sender, receiver) = channel();
        Ok(Self {
            store,
            rules,
            handlers,
            clock: LogicalClock::seeded_from(seed),
            flow_tokens,
            sender,
            receiver,
            spec_hash,
            engine_version,
            ir_version,
        })
    }

    /// Returns a cloneable sender other threads can use to enqueue
    /// invocations while `run` drives the loop.
    #[must_use]
    pub fn sender(&self) -> MailboxSender {
        self.sender.clone()
    }

    /// Grants direct access to the underlying store, e.g. so a caller can
    /// `ensure_table` a concept's state schema before the loop starts.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Enqueues `spec`, minting a fresh flow token if it has none.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MailboxClosed`] if the loop's receiver has
    /// been dropped, which cannot happen while this engine instance lives.
    pub fn enqueue(&mut self, mut spec: InvocationSpec) -> Result<(), EngineError> {
        if spec.flow_token.is_none() {
            spec.flow_token = Some(self.flow_tokens.next_flow_token());
        }
        self.sender.send(spec).map_err(|_| EngineError::MailboxClosed)
    }

    /// Runs the event loop until every mailbox sender has disconnected or
    /// `cancellation` is requested. Cancellation is honored only at tick
    /// boundaries (spec §5).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if a tick's store write fails; the
    /// current tick's partial effects are left exactly as the store
    /// implementation guarantees (spec §4.G "Failure semantics").
    pub fn run(&mut self, cancellation: &CancellationToken) -> Result<(), EngineError> {
        loop {
            if cancellation.is_cancelled() {
                return Ok(());
            }
            match self.receiver.poll(CANCELLATION_POLL_INTERVAL) {
                MailboxEvent::Spec(spec) => self.tick(spec)?,
                MailboxEvent::Timeout => {}
                MailboxEvent::Disconnected => return Ok(()),
            }
        }
    }

    /// Drains every currently pending invocation without blocking for new
    /// ones, suitable for the harness and the CLI's `run` subcommand, which
    /// drive a bounded flow to completion rather than a long-lived server.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if a tick's store write fails.
    pub fn drain(&mut self) -> Result<(), EngineError> {
        while let Some(spec) = self.receiver.try_recv() {
            self.tick(spec)?;
        }
        Ok(())
    }

    /// Runs one iteration of the event loop's six-step tick (spec §4.G).
    fn tick(&mut self, spec: InvocationSpec) -> Result<(), EngineError> {
        let flow_token = spec.flow_token.unwrap_or_else(|| self.flow_tokens.next_flow_token());
        let seq = spec.seq.unwrap_or_else(|| self.clock.next());
        let id = InvocationId::new(identity::invocation_id(flow_token.as_str(), spec.action_uri.as_str(), &spec.args, seq));
        let invocation = Invocation {
            id,
            flow_token,
            action_uri: spec.action_uri,
            args: spec.args,
            seq,
            security_context: spec.security_context,
            spec_hash: self.spec_hash.clone(),
            engine_version: self.engine_version.clone(),
            ir_version: self.ir_version.clone(),
        };
        self.store.write_invocation(&invocation)?;

        let handler = self.handlers.get(invocation.action_uri.as_str()).ok_or_else(|| EngineError::UnknownAction(invocation.action_uri.as_str().to_string()))?;
        let (output_case, result) = handler.invoke(&invocation.args, &mut self.store as &mut dyn ConceptStateStore)?;

        let seq = self.clock.next();
        let completion_id = CompletionId::new(identity::completion_id(invocation.id.as_str(), output_case.as_str(), &result, seq));
        let completion = Completion {
            id: completion_id,
            invocation_id: invocation.id.clone(),
            output_case,
            result,
            seq,
            security_context: invocation.security_context.clone(),
        };
        self.store.write_completion(&completion)?;

        self.apply_completion(&invocation, &completion)
    }

    /// Matches `completion` against every sync rule and fires the ones
    /// that apply (spec §4.G "Sync matching").
    fn apply_completion(&mut self, invocation: &Invocation, completion: &Completion) -> Result<(), EngineError> {
        let rules = self.rules.clone();
        for rule in &rules {
            if rule.when.event_type != EventType::Completed {
                continue;
            }
            if rule.when.action_ref != invocation.action_uri {
                continue;
            }
            if let Some(expected_case) = &rule.when.output_case {
                if expected_case != &completion.output_case {
                    continue;
                }
            }

            let when_bindings = evaluate_when_bindings(&invocation.args, &completion.result, &rule.when.bindings)?;
            let binding_rows = self.extend_bindings(rule, &when_bindings)?;

            for binding_row in binding_rows {
                let hash = BindingHash::new(identity::binding_hash(&binding_row));
                let seq = self.clock.next();
                let Some(firing_id) = self.store.try_fire(&completion.id, &rule.id, &hash, seq)? else {
                    continue;
                };

                let args = evaluate_then_args(&rule.then.args, &binding_row)?;
                let derived_flow_token = self.derive_flow_token(rule, invocation, &binding_row)?;
                // Mint this derived invocation's `seq`/id now, not at its own
                // tick, so the provenance edge below can name it immediately
                // (spec §4.G step (c)). A binding row's derived `seq` can end
                // up lower than one minted by some other invocation that
                // gets its own tick (and writes its own, later-minted seq)
                // before this one is dequeued; the store only enforces `seq`
                // uniqueness, not write-order, so that is fine.
                let derived_seq = self.clock.next();
                let derived_id = InvocationId::new(identity::invocation_id(derived_flow_token.as_str(), rule.then.action_ref.as_str(), &args, derived_seq));
                let derived = InvocationSpec {
                    action_uri: rule.then.action_ref.clone(),
                    args,
                    flow_token: Some(derived_flow_token),
                    security_context: invocation.security_context.clone(),
                    seq: Some(derived_seq),
                };
                self.enqueue(derived)?;
                self.store.add_provenance(firing_id, &derived_id)?;
            }
        }
        Ok(())
    }

    /// Extends the when-binding map with rows from the where-clause query,
    /// or returns the when-binding map alone when there is no where-clause.
    fn extend_bindings(&self, rule: &SyncRule, when_bindings: &std::collections::BTreeMap<String, Value>) -> Result<Vec<std::collections::BTreeMap<String, Value>>, EngineError> {
        let Some(where_clause) = &rule.where_clause else {
            return Ok(vec![when_bindings.clone()]);
        };
        let select = Select {
            from: where_clause.source.clone(),
            filter: Some(lower_filter(&where_clause.filter)),
            bindings: where_clause.bindings.clone(),
        };
        let query = Query::Select(select);
        let (sql, params) = compile(&query, when_bindings)?;
        let rows = self.store.query(&sql, &params)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut merged = when_bindings.clone();
                merged.extend(row);
                merged
            })
            .collect())
    }

    /// Resolves the flow token a derived invocation should carry, per the
    /// firing rule's scope (spec §4.G "Scope semantics").
    fn derive_flow_token(&self, rule: &SyncRule, invocation: &Invocation, binding_row: &std::collections::BTreeMap<String, Value>) -> Result<FlowToken, EngineError> {
        match rule.scope.mode {
            ScopeMode::Flow => Ok(invocation.flow_token.clone()),
            ScopeMode::Global => Ok(FlowToken::new(GLOBAL_SCOPE_TOKEN)),
            ScopeMode::Keyed => {
                let key_var = rule.scope.key.as_deref().ok_or_else(|| EngineError::MissingScopeKey(rule.id.as_str().to_string()))?;
                let key_value = binding_row.get(key_var).ok_or_else(|| EngineError::UnboundVariable(key_var.to_string()))?;
                Ok(FlowToken::new(value_to_key(key_value)))
            }
        }
    }
}

/// Converts a binding value into a flow-token key string. Scalars map to
/// their natural textual form; compound values fall back to their
/// canonical encoding so the key stays deterministic.
fn value_to_key(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => String::from_utf8_lossy(&value.canonical_encode()).into_owned(),
    }
}

/// Computes the highest `seq` already written across every flow in `store`,
/// using only operations [`EventStore`] already exposes (spec §4.F), so the
/// engine does not widen that trait just to resume a clock.
fn highest_existing_seq<S: EventStore>(store: &S) -> Result<i64, EngineError> {
    let mut highest = 0_i64;
    for flow_token in store.list_flow_tokens()? {
        let state = store.get_flow_state(&flow_token)?;
        for invocation in &state.invocations {
            highest = highest.max(invocation.seq);
        }
        for completion in &state.completions {
            highest = highest.max(completion.seq);
        }
        for firing in &state.sync_firings {
            highest = highest.max(firing.seq);
        }
    }
    Ok(highest)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use nysm_ir::ActionUri;
    use nysm_ir::OutputCase;
    use nysm_ir::Scope;
    use nysm_ir::ThenClause;
    use nysm_ir::WhenClause;
    use nysm_store::InMemoryEventStore;
    use nysm_store::Row;

    use super::*;

    fn engine_with_echo_handler() -> SyncEngine<InMemoryEventStore> {
        let handlers = HandlerRegistry::new().register("Cart.addItem", |args: &Value, _state: &mut dyn ConceptStateStore| {
            Ok((OutputCase::new("Added"), args.clone()))
        });
        SyncEngine::new(
            InMemoryEventStore::new(),
            Vec::new(),
            handlers,
            Box::new(SequentialFlowTokenGenerator::new()),
            SpecHash::new("test-spec-hash"),
            EngineVersion::new("0.1.0"),
            IrVersion::new("1"),
        )
        .expect("construction succeeds against an empty store")
    }

    #[test]
    fn a_root_invocation_without_a_flow_token_gets_one_minted() {
        let mut engine = engine_with_echo_handler();
        let args = Value::object([("item_id".to_string(), Value::String("widget".to_string()))]);
        engine.enqueue(InvocationSpec::root(ActionUri::new("Cart.addItem"), args)).expect("enqueue succeeds");
        engine.drain().expect("drain succeeds");

        let flows = engine.store.list_flow_tokens().expect("list flow tokens");
        assert_eq!(flows.len(), 1);
        let state = engine.store.get_flow_state(&flows[0]).expect("flow state");
        assert_eq!(state.invocations.len(), 1);
        assert_eq!(state.completions.len(), 1);
        assert!(state.is_complete);
    }

    #[test]
    fn unknown_action_uri_is_rejected_before_any_write() {
        let mut engine = engine_with_echo_handler();
        let args = Value::object(std::iter::empty::<(String, Value)>());
        engine.enqueue(InvocationSpec::root(ActionUri::new("Cart.missing"), args)).expect("enqueue succeeds");
        let err = engine.drain().unwrap_err();
        assert!(matches!(err, EngineError::UnknownAction(_)));
    }

    #[test]
    fn a_completed_sync_rule_enqueues_and_fires_exactly_once_per_binding() {
        let handlers = HandlerRegistry::new()
            .register("Cart.addItem", |args: &Value, _state: &mut dyn ConceptStateStore| Ok((OutputCase::new("Added"), args.clone())))
            .register("Inventory.reserve", |args: &Value, _state: &mut dyn ConceptStateStore| Ok((OutputCase::new("Reserved"), args.clone())));

        let mut when_bindings = BTreeMap::new();
        when_bindings.insert("item_id".to_string(), "args.item_id".to_string());

        let mut then_args = BTreeMap::new();
        then_args.insert(
            "item_id".to_string(),
            nysm_ir::ArgExpr::Var {
                name: "item_id".to_string(),
            },
        );

        let rule = SyncRule {
            id: nysm_ir::SyncRuleId::new("reserve-on-add"),
            scope: Scope {
                mode: ScopeMode::Flow,
                key: None,
            },
            when: WhenClause {
                action_ref: ActionUri::new("Cart.addItem"),
                event_type: EventType::Completed,
                output_case: None,
                bindings: when_bindings,
            },
            where_clause: None,
            then: ThenClause {
                action_ref: ActionUri::new("Inventory.reserve"),
                args: then_args,
            },
        };

        let mut engine = SyncEngine::new(
            InMemoryEventStore::new(),
            vec![rule],
            handlers,
            Box::new(SequentialFlowTokenGenerator::new()),
            SpecHash::new("test-spec-hash"),
            EngineVersion::new("0.1.0"),
            IrVersion::new("1"),
        )
        .expect("construction succeeds");

        let args = Value::object([("item_id".to_string(), Value::String("widget".to_string()))]);
        engine.enqueue(InvocationSpec::root(ActionUri::new("Cart.addItem"), args)).expect("enqueue succeeds");
        engine.drain().expect("drain succeeds");

        let flows = engine.store.list_flow_tokens().expect("list flow tokens");
        assert_eq!(flows.len(), 1);
        let state = engine.store.get_flow_state(&flows[0]).expect("flow state");
        assert_eq!(state.invocations.len(), 2, "cart addItem plus the derived inventory reserve");
        assert_eq!(state.completions.len(), 2);
        assert_eq!(state.sync_firings.len(), 1);
    }

    #[test]
    fn resuming_an_engine_seeds_its_clock_above_the_stores_highest_seq() {
        let store = InMemoryEventStore::new();
        {
            let mut seed_engine = SyncEngine::new(
                store.clone(),
                Vec::new(),
                HandlerRegistry::new().register("Cart.addItem", |args: &Value, _state: &mut dyn ConceptStateStore| Ok((OutputCase::new("Added"), args.clone()))),
                Box::new(SequentialFlowTokenGenerator::new()),
                SpecHash::new("test-spec-hash"),
                EngineVersion::new("0.1.0"),
                IrVersion::new("1"),
            )
            .expect("construction succeeds");
            let args = Value::object(std::iter::empty::<(String, Value)>());
            seed_engine.enqueue(InvocationSpec::root(ActionUri::new("Cart.addItem"), args)).expect("enqueue succeeds");
            seed_engine.drain().expect("drain succeeds");
        }

        let resumed = SyncEngine::new(
            store,
            Vec::new(),
            HandlerRegistry::new(),
            Box::new(SequentialFlowTokenGenerator::new()),
            SpecHash::new("test-spec-hash"),
            EngineVersion::new("0.1.0"),
            IrVersion::new("1"),
        )
        .expect("construction succeeds against a non-empty store");
        assert!(resumed.clock.next() > 2, "resumed clock must start above both seqs already written");
    }

    /// Re-applying an already-processed completion directly must not
    /// produce a second `sync_firings` row for the same
    /// `(completion_id, sync_id, binding_hash)` key.
    #[test]
    fn reapplying_a_completion_does_not_refire_its_sync_rule() {
        let handlers = HandlerRegistry::new()
            .register("Cart.addItem", |args: &Value, _state: &mut dyn ConceptStateStore| Ok((OutputCase::new("Added"), args.clone())))
            .register("Inventory.reserve", |args: &Value, _state: &mut dyn ConceptStateStore| Ok((OutputCase::new("Reserved"), args.clone())));

        let mut when_bindings = BTreeMap::new();
        when_bindings.insert("item_id".to_string(), "args.item_id".to_string());
        let mut then_args = BTreeMap::new();
        then_args.insert(
            "item_id".to_string(),
            nysm_ir::ArgExpr::Var {
                name: "item_id".to_string(),
            },
        );
        let rule = SyncRule {
            id: nysm_ir::SyncRuleId::new("reserve-on-add"),
            scope: Scope {
                mode: ScopeMode::Flow,
                key: None,
            },
            when: WhenClause {
                action_ref: ActionUri::new("Cart.addItem"),
                event_type: EventType::Completed,
                output_case: None,
                bindings: when_bindings,
            },
            where_clause: None,
            then: ThenClause {
                action_ref: ActionUri::new("Inventory.reserve"),
                args: then_args,
            },
        };

        let mut engine = SyncEngine::new(
            InMemoryEventStore::new(),
            vec![rule],
            handlers,
            Box::new(SequentialFlowTokenGenerator::new()),
            SpecHash::new("test-spec-hash"),
            EngineVersion::new("0.1.0"),
            IrVersion::new("1"),
        )
        .expect("construction succeeds");

        let args = Value::object([("item_id".to_string(), Value::String("widget".to_string()))]);
        engine.enqueue(InvocationSpec::root(ActionUri::new("Cart.addItem"), args)).expect("enqueue succeeds");
        engine.drain().expect("drain succeeds");

        let flows = engine.store.list_flow_tokens().expect("list flow tokens");
        let state = engine.store.get_flow_state(&flows[0]).expect("flow state");
        assert_eq!(state.sync_firings.len(), 1);

        let add_item_invocation = state.invocations.iter().find(|inv| inv.action_uri.as_str() == "Cart.addItem").expect("addItem invocation recorded").clone();
        let add_item_completion = state.completions.iter().find(|comp| comp.invocation_id == add_item_invocation.id).expect("addItem completion recorded").clone();

        engine.apply_completion(&add_item_invocation, &add_item_completion).expect("reapplying a completion is not itself an error");

        let state_after = engine.store.get_flow_state(&flows[0]).expect("flow state after reapplying");
        assert_eq!(state_after.sync_firings.len(), 1, "the same completion must not refire the rule a second time");
    }

    /// A single completion whose where-clause fans out to more than one
    /// binding row must enqueue a derived invocation per row, and every one
    /// of them must still get written even though their pre-minted `seq`s
    /// do not arrive at the store in mint order.
    #[test]
    fn a_where_clause_fanning_out_to_multiple_rows_derives_an_invocation_per_row() {
        let handlers = HandlerRegistry::new()
            .register("Cart.checkout", |_args: &Value, _state: &mut dyn ConceptStateStore| {
                Ok((OutputCase::new("Success"), Value::object([("cart_id".to_string(), Value::String("cart-1".to_string()))])))
            })
            .register("Inventory.reserve", |args: &Value, _state: &mut dyn ConceptStateStore| Ok((OutputCase::new("Reserved"), args.clone())));

        let mut when_bindings = BTreeMap::new();
        when_bindings.insert("cart_id".to_string(), "result.cart_id".to_string());

        let mut where_bindings = BTreeMap::new();
        where_bindings.insert("item_id".to_string(), "item_id".to_string());

        let mut then_args = BTreeMap::new();
        then_args.insert(
            "item_id".to_string(),
            nysm_ir::ArgExpr::Var {
                name: "item_id".to_string(),
            },
        );

        let rule = SyncRule {
            id: nysm_ir::SyncRuleId::new("reserve-every-line"),
            scope: Scope {
                mode: ScopeMode::Flow,
                key: None,
            },
            when: WhenClause {
                action_ref: ActionUri::new("Cart.checkout"),
                event_type: EventType::Completed,
                output_case: None,
                bindings: when_bindings,
            },
            where_clause: Some(nysm_ir::WhereClause {
                source: "cart_items".to_string(),
                filter: nysm_ir::FilterSpec::BoundEquals {
                    field: "cart_id".to_string(),
                    bound_var: "cart_id".to_string(),
                },
                bindings: where_bindings,
            }),
            then: ThenClause {
                action_ref: ActionUri::new("Inventory.reserve"),
                args: then_args,
            },
        };

        let mut engine = SyncEngine::new(
            InMemoryEventStore::new(),
            vec![rule],
            handlers,
            Box::new(SequentialFlowTokenGenerator::new()),
            SpecHash::new("test-spec-hash"),
            EngineVersion::new("0.1.0"),
            IrVersion::new("1"),
        )
        .expect("construction succeeds");

        let columns = vec![
            ("id".to_string(), nysm_ir::TypeName::String),
            ("cart_id".to_string(), nysm_ir::TypeName::String),
            ("item_id".to_string(), nysm_ir::TypeName::String),
        ];
        engine.store_mut().ensure_table("cart_items", &columns).expect("ensure table");
        for (id, item_id) in [("line-1", "widget"), ("line-2", "gadget")] {
            let mut row = Row::new();
            row.insert("id".to_string(), Value::String(id.to_string()));
            row.insert("cart_id".to_string(), Value::String("cart-1".to_string()));
            row.insert("item_id".to_string(), Value::String(item_id.to_string()));
            engine.store_mut().upsert_row("cart_items", row).expect("seed cart line");
        }

        engine.enqueue(InvocationSpec::root(ActionUri::new("Cart.checkout"), Value::object(std::iter::empty::<(String, Value)>()))).expect("enqueue succeeds");
        engine.drain().expect("drain succeeds");

        let flows = engine.store.list_flow_tokens().expect("list flow tokens");
        assert_eq!(flows.len(), 1);
        let state = engine.store.get_flow_state(&flows[0]).expect("flow state");
        assert_eq!(state.sync_firings.len(), 2, "one firing per fanned-out binding row");
        let reserve_count = state.invocations.iter().filter(|inv| inv.action_uri.as_str() == "Inventory.reserve").count();
        assert_eq!(reserve_count, 2, "each cart line must derive its own reserve invocation");
        assert_eq!(state.invocations.len(), 3, "checkout plus two derived reserves");
        assert_eq!(state.completions.len(), 3);
        assert!(state.is_complete);
    }
}
