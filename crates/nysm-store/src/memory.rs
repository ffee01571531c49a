// crates/nysm-store/src/memory.rs
// ============================================================================
// Module: In-Memory Event Store
// Description: Reference `EventStore` + `ConceptStateStore` implementation
//              for tests and the conformance harness.
// Purpose: Provide a deterministic store implementation without external
//          storage dependencies.
// Dependencies: crate::{contract, error, event, sql_interp, state}, nysm-ir
// ============================================================================

//! ## Overview
//! This module mirrors the shape of a simple in-memory state store: a
//! mutex-guarded inner map, a clonable handle sharing one `Arc`. It is not
//! intended for production use — see `nysm-store-sqlite` for a persistent
//! implementation of the same contract.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use nysm_ir::BindingHash;
use nysm_ir::Completion;
use nysm_ir::CompletionId;
use nysm_ir::FlowToken;
use nysm_ir::Invocation;
use nysm_ir::InvocationId;
use nysm_ir::ProvenanceEdge;
use nysm_ir::SyncFiring;
use nysm_ir::SyncRuleId;
use nysm_ir::Value;

use crate::contract::EventStore;
use crate::contract::FlowState;
use crate::contract::Row;
use crate::error::StoreError;
use crate::event::FlowEvent;
use crate::event::order_key;
use crate::sql_interp;
use crate::state::ConceptStateStore;

// ============================================================================
// SECTION: Inner State
// ============================================================================

#[derive(Debug, Default)]
struct Inner {
    invocations: Vec<Invocation>,
    completions: Vec<Completion>,
    sync_firings: Vec<SyncFiring>,
    provenance_edges: Vec<ProvenanceEdge>,
    seen_invocation_ids: BTreeSet<String>,
    seen_completion_ids: BTreeSet<String>,
    fired_keys: BTreeSet<(String, String, String)>,
    used_seqs: BTreeSet<i64>,
    next_firing_id: i64,
    next_edge_id: i64,
    tables: BTreeMap<String, Vec<Row>>,
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory event store for tests and the conformance harness.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryEventStore {
    /// Creates a new, empty in-memory event store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Io("event store mutex poisoned".to_string()))
    }
}

impl EventStore for InMemoryEventStore {
    fn write_invocation(&mut self, invocation: &Invocation) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard.seen_invocation_ids.contains(invocation.id.as_str()) {
            return Ok(());
        }
        if guard.used_seqs.contains(&invocation.seq) {
            return Err(StoreError::SeqAlreadyUsed {
                seq: invocation.seq,
            });
        }
        guard.used_seqs.insert(invocation.seq);
        guard.seen_invocation_ids.insert(invocation.id.as_str().to_string());
        guard.invocations.push(invocation.clone());
        Ok(())
    }

    fn write_completion(&mut self, completion: &Completion) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard.seen_completion_ids.contains(completion.id.as_str()) {
            return Ok(());
        }
        if !guard.seen_invocation_ids.contains(completion.invocation_id.as_str()) {
            return Err(StoreError::DanglingReference(format!(
                "completion {} references unknown invocation {}",
                completion.id,
                completion.invocation_id,
            )));
        }
        if guard.used_seqs.contains(&completion.seq) {
            return Err(StoreError::SeqAlreadyUsed {
                seq: completion.seq,
            });
        }
        guard.used_seqs.insert(completion.seq);
        guard.seen_completion_ids.insert(completion.id.as_str().to_string());
        guard.completions.push(completion.clone());
        Ok(())
    }

    fn try_fire(
        &mut self,
        completion_id: &CompletionId,
        sync_id: &SyncRuleId,
        binding_hash: &BindingHash,
        seq: i64,
    ) -> Result<Option<i64>, StoreError> {
        let mut guard = self.lock()?;
        let key = (
            completion_id.as_str().to_string(),
            sync_id.as_str().to_string(),
            binding_hash.as_str().to_string(),
        );
        if guard.fired_keys.contains(&key) {
            return Ok(None);
        }
        let id = guard.next_firing_id;
        guard.next_firing_id += 1;
        guard.fired_keys.insert(key);
        guard.used_seqs.insert(seq);
        guard.sync_firings.push(SyncFiring {
            id,
            completion_id: completion_id.clone(),
            sync_id: sync_id.clone(),
            binding_hash: binding_hash.clone(),
            seq,
        });
        Ok(Some(id))
    }

    fn add_provenance(&mut self, sync_firing_id: i64, invocation_id: &InvocationId) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let id = guard.next_edge_id;
        guard.next_edge_id += 1;
        guard.provenance_edges.push(ProvenanceEdge {
            id,
            sync_firing_id,
            invocation_id: invocation_id.clone(),
        });
        Ok(())
    }

    fn list_flow_tokens(&self) -> Result<Vec<FlowToken>, StoreError> {
        let guard = self.lock()?;
        let tokens: BTreeSet<FlowToken> = guard.invocations.iter().map(|inv| inv.flow_token.clone()).collect();
        Ok(tokens.into_iter().collect())
    }

    fn replay_flow(&self, flow_token: &FlowToken) -> Result<Vec<FlowEvent>, StoreError> {
        let guard = self.lock()?;
        let mut events = flow_events(&guard, flow_token);
        events.sort_by_key(|event| order_key(event));
        Ok(events)
    }

    fn get_flow_state(&self, flow_token: &FlowToken) -> Result<FlowState, StoreError> {
        let guard = self.lock()?;
        let invocations: Vec<Invocation> = guard
            .invocations
            .iter()
            .filter(|inv| &inv.flow_token == flow_token)
            .cloned()
            .collect();
        let invocation_ids: BTreeSet<String> = invocations.iter().map(|inv| inv.id.as_str().to_string()).collect();
        let completions: Vec<Completion> = guard
            .completions
            .iter()
            .filter(|comp| invocation_ids.contains(comp.invocation_id.as_str()))
            .cloned()
            .collect();
        let completed_invocation_ids: BTreeSet<&str> = completions.iter().map(|comp| comp.invocation_id.as_str()).collect();
        let completion_ids: BTreeSet<String> = completions.iter().map(|comp| comp.id.as_str().to_string()).collect();
        let sync_firings: Vec<SyncFiring> = guard
            .sync_firings
            .iter()
            .filter(|firing| completion_ids.contains(firing.completion_id.as_str()))
            .cloned()
            .collect();
        let is_complete = invocations.iter().all(|inv| completed_invocation_ids.contains(inv.id.as_str()));
        Ok(FlowState {
            invocations,
            completions,
            sync_firings,
            is_complete,
        })
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let guard = self.lock()?;
        sql_interp::execute(&guard.tables, sql, params)
    }
}

fn flow_events(inner: &Inner, flow_token: &FlowToken) -> Vec<FlowEvent> {
    let matching_invocation_ids: BTreeSet<&str> = inner
        .invocations
        .iter()
        .filter(|inv| &inv.flow_token == flow_token)
        .map(|inv| inv.id.as_str())
        .collect();

    let mut events = Vec::new();
    for inv in &inner.invocations {
        if matching_invocation_ids.contains(inv.id.as_str()) {
            events.push(FlowEvent::Invocation {
                seq: inv.seq,
                id: inv.id.clone(),
                action_uri: inv.action_uri.clone(),
                args: inv.args.clone(),
                security_context: inv.security_context.clone(),
            });
        }
    }
    for comp in &inner.completions {
        if matching_invocation_ids.contains(comp.invocation_id.as_str()) {
            events.push(FlowEvent::Completion {
                seq: comp.seq,
                id: comp.id.clone(),
                invocation_id: comp.invocation_id.clone(),
                output_case: comp.output_case.clone(),
                result: comp.result.clone(),
                security_context: comp.security_context.clone(),
            });
        }
    }
    events
}

impl ConceptStateStore for InMemoryEventStore {
    fn ensure_table(&mut self, table: &str, _columns: &[(String, nysm_ir::TypeName)]) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.tables.entry(table.to_string()).or_default();
        Ok(())
    }

    fn upsert_row(&mut self, table: &str, row: Row) -> Result<(), StoreError> {
        let id = row
            .get("id")
            .cloned()
            .ok_or_else(|| StoreError::Query(format!("row written to table '{table}' is missing an 'id' column")))?;
        let mut guard = self.lock()?;
        let rows = guard.tables.entry(table.to_string()).or_default();
        if let Some(existing) = rows.iter_mut().find(|r| r.get("id") == Some(&id)) {
            *existing = row;
        } else {
            rows.push(row);
        }
        Ok(())
    }

    fn list_rows(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.tables.get(table).cloned().unwrap_or_default())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use nysm_ir::ActionUri;
    use nysm_ir::EngineVersion;
    use nysm_ir::IrVersion;
    use nysm_ir::OutputCase;
    use nysm_ir::SecurityContext;
    use nysm_ir::SpecHash;
    use nysm_ir::Value;

    use super::*;

    fn sample_invocation(id: &str, flow: &str, seq: i64) -> Invocation {
        Invocation {
            id: InvocationId::new(id),
            flow_token: FlowToken::new(flow),
            action_uri: ActionUri::new("Cart.addItem"),
            args: Value::object(std::iter::empty::<(String, Value)>()),
            seq,
            security_context: SecurityContext::default(),
            spec_hash: SpecHash::new("spec-hash"),
            engine_version: EngineVersion::new("0.1.0"),
            ir_version: IrVersion::new("1"),
        }
    }

    #[test]
    fn write_invocation_is_idempotent_on_id() {
        let mut store = InMemoryEventStore::new();
        let inv = sample_invocation("inv-1", "flow-1", 1);
        store.write_invocation(&inv).expect("first write succeeds");
        store.write_invocation(&inv).expect("replay is a no-op");
        let state = store.get_flow_state(&FlowToken::new("flow-1")).expect("state");
        assert_eq!(state.invocations.len(), 1);
    }

    #[test]
    fn write_invocation_rejects_a_reused_seq() {
        let mut store = InMemoryEventStore::new();
        store.write_invocation(&sample_invocation("inv-1", "flow-1", 5)).expect("first write");
        let err = store.write_invocation(&sample_invocation("inv-2", "flow-1", 5)).unwrap_err();
        assert!(matches!(err, StoreError::SeqAlreadyUsed { .. }));
    }

    /// A derived invocation's `seq` is minted ahead of its own tick (spec
    /// §4.G step (c)) and may be lower than a `seq` some other, later-minted
    /// invocation already wrote in the meantime. As long as the lower `seq`
    /// is unused, writing it out of mint order must still succeed.
    #[test]
    fn write_invocation_accepts_an_unused_seq_lower_than_an_already_written_one() {
        let mut store = InMemoryEventStore::new();
        store.write_invocation(&sample_invocation("inv-later", "flow-1", 10)).expect("write the higher seq first");
        store
            .write_invocation(&sample_invocation("inv-earlier", "flow-1", 4))
            .expect("a lower, still-unused seq must not be rejected just because it arrives second");
        let state = store.get_flow_state(&FlowToken::new("flow-1")).expect("state");
        assert_eq!(state.invocations.len(), 2);
    }

    #[test]
    fn write_completion_rejects_dangling_invocation() {
        let mut store = InMemoryEventStore::new();
        let completion = Completion {
            id: CompletionId::new("comp-1"),
            invocation_id: InvocationId::new("missing"),
            output_case: OutputCase::new("Success"),
            result: Value::object(std::iter::empty::<(String, Value)>()),
            seq: 2,
            security_context: SecurityContext::default(),
        };
        let err = store.write_completion(&completion).unwrap_err();
        assert!(matches!(err, StoreError::DanglingReference(_)));
    }

    #[test]
    fn try_fire_is_idempotent_per_unique_key() {
        let mut store = InMemoryEventStore::new();
        let completion_id = CompletionId::new("comp-1");
        let sync_id = SyncRuleId::new("sync-1");
        let binding_hash = BindingHash::new("hash-1");
        let first = store.try_fire(&completion_id, &sync_id, &binding_hash, 10).expect("ok");
        let second = store.try_fire(&completion_id, &sync_id, &binding_hash, 11).expect("ok");
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn replaying_a_flow_twice_yields_identical_event_lists() {
        let mut store = InMemoryEventStore::new();
        let flow = FlowToken::new("flow-1");
        store.write_invocation(&sample_invocation("inv-1", "flow-1", 1)).expect("write invocation");
        store
            .write_completion(&Completion {
                id: CompletionId::new("comp-1"),
                invocation_id: InvocationId::new("inv-1"),
                output_case: OutputCase::new("Added"),
                result: Value::object(std::iter::empty::<(String, Value)>()),
                seq: 2,
                security_context: SecurityContext::default(),
            })
            .expect("write completion");

        let first = store.replay_flow(&flow).expect("first replay");
        let second = store.replay_flow(&flow).expect("second replay");
        assert_eq!(first, second, "replaying the same flow twice must yield identical event lists");
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn upsert_row_replaces_matching_id() {
        let mut store = InMemoryEventStore::new();
        let mut row = Row::new();
        row.insert("id".to_string(), Value::String("widget".to_string()));
        row.insert("quantity".to_string(), Value::Int(10));
        store.upsert_row("inventory", row).expect("insert");

        let mut update = Row::new();
        update.insert("id".to_string(), Value::String("widget".to_string()));
        update.insert("quantity".to_string(), Value::Int(7));
        store.upsert_row("inventory", update).expect("update");

        let rows = store.list_rows("inventory").expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("quantity"), Some(&Value::Int(7)));
    }
}
