// crates/nysm-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Validate SqliteEventStore/ConceptStateStore behavior.
// Purpose: Ensure durable persistence, idempotency, and integrity checks.
// Dependencies: nysm-ir, nysm-store, nysm-store-sqlite, tempfile
// ============================================================================

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions are permitted.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use nysm_ir::ActionUri;
use nysm_ir::Completion;
use nysm_ir::CompletionId;
use nysm_ir::EngineVersion;
use nysm_ir::FlowToken;
use nysm_ir::Invocation;
use nysm_ir::InvocationId;
use nysm_ir::IrVersion;
use nysm_ir::OutputCase;
use nysm_ir::SecurityContext;
use nysm_ir::SpecHash;
use nysm_ir::TypeName;
use nysm_ir::Value;
use nysm_store::ConceptStateStore;
use nysm_store::EventStore;
use nysm_store::StoreError;
use nysm_store_sqlite::SqliteEventStore;
use nysm_store_sqlite::SqliteStoreConfig;
use tempfile::tempdir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn sample_invocation(seq: i64, flow: &str) -> Invocation {
    Invocation {
        id: InvocationId::new(format!("inv-{seq}")),
        flow_token: FlowToken::new(flow.to_string()),
        action_uri: ActionUri::new("Cart.checkout".to_string()),
        args: Value::object(std::iter::empty::<(String, Value)>()),
        seq,
        security_context: SecurityContext::default(),
        spec_hash: SpecHash::new("spec-hash".to_string()),
        engine_version: EngineVersion::new("0.1.0".to_string()),
        ir_version: IrVersion::new("1".to_string()),
    }
}

fn sample_completion(seq: i64, invocation_id: &InvocationId) -> Completion {
    Completion {
        id: CompletionId::new(format!("comp-{seq}")),
        invocation_id: invocation_id.clone(),
        output_case: OutputCase::new("ok".to_string()),
        result: Value::object(std::iter::empty::<(String, Value)>()),
        seq,
        security_context: SecurityContext::default(),
    }
}

fn open_store() -> (tempfile::TempDir, SqliteEventStore) {
    let dir = tempdir().expect("create tempdir");
    let config = SqliteStoreConfig {
        path: dir.path().join("nysm.sqlite3"),
        busy_timeout_ms: 1_000,
        journal_mode: nysm_store_sqlite::SqliteStoreMode::default(),
        sync_mode: nysm_store_sqlite::SqliteSyncMode::default(),
    };
    let store = SqliteEventStore::open(&config).expect("open store");
    (dir, store)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn write_invocation_then_completion_roundtrips_through_replay() {
    let (_dir, mut store) = open_store();
    let invocation = sample_invocation(1, "flow-1");
    store.write_invocation(&invocation).expect("write invocation");
    let completion = sample_completion(2, &invocation.id);
    store.write_completion(&completion).expect("write completion");

    let events = store.replay_flow(&FlowToken::new("flow-1")).expect("replay");
    assert_eq!(events.len(), 2);

    let state = store.get_flow_state(&FlowToken::new("flow-1")).expect("flow state");
    assert!(state.is_complete);
    assert_eq!(state.invocations.len(), 1);
    assert_eq!(state.completions.len(), 1);
}

#[test]
fn write_invocation_is_idempotent_on_id() {
    let (_dir, mut store) = open_store();
    let invocation = sample_invocation(1, "flow-1");
    store.write_invocation(&invocation).expect("first write");
    store.write_invocation(&invocation).expect("duplicate write is a no-op");

    let state = store.get_flow_state(&FlowToken::new("flow-1")).expect("flow state");
    assert_eq!(state.invocations.len(), 1);
}

#[test]
fn completion_referencing_unknown_invocation_is_rejected() {
    let (_dir, mut store) = open_store();
    let dangling = sample_completion(1, &InvocationId::new("does-not-exist".to_string()));
    let err = store.write_completion(&dangling).expect_err("dangling reference must fail");
    assert!(matches!(err, StoreError::DanglingReference(_)));
}

#[test]
fn seq_must_be_unique_across_the_whole_store() {
    let (_dir, mut store) = open_store();
    store.write_invocation(&sample_invocation(5, "flow-1")).expect("write first");
    let err = store.write_invocation(&sample_invocation(5, "flow-1")).expect_err("reused seq must fail");
    assert!(matches!(err, StoreError::SeqAlreadyUsed { .. }));
}

/// A sync rule reserves a derived invocation's `seq` before that
/// invocation's own tick runs (spec §4.G step (c)), so a lower `seq` can
/// legitimately arrive and be written after a higher one already has.
#[test]
fn a_lower_seq_may_be_written_after_a_higher_one_as_long_as_it_is_unused() {
    let (_dir, mut store) = open_store();
    store.write_invocation(&sample_invocation(10, "flow-1")).expect("write the higher seq first");
    store
        .write_invocation(&sample_invocation(3, "flow-1"))
        .expect("a lower, still-unused seq must not be rejected for arriving out of mint order");

    let state = store.get_flow_state(&FlowToken::new("flow-1")).expect("flow state");
    assert_eq!(state.invocations.len(), 2);
}

#[test]
fn try_fire_is_idempotent_on_the_binding_key() {
    let (_dir, mut store) = open_store();
    let invocation = sample_invocation(1, "flow-1");
    store.write_invocation(&invocation).expect("write invocation");
    let completion = sample_completion(2, &invocation.id);
    store.write_completion(&completion).expect("write completion");

    let sync_id = nysm_ir::SyncRuleId::new("rule-a".to_string());
    let binding_hash = nysm_ir::BindingHash::new("binding-a".to_string());
    let first = store.try_fire(&completion.id, &sync_id, &binding_hash, 3).expect("first fire");
    let second = store.try_fire(&completion.id, &sync_id, &binding_hash, 3).expect("second fire");
    assert!(first.is_some());
    assert!(second.is_none());
}

#[test]
fn concept_state_table_roundtrips_typed_columns_through_query() {
    let (_dir, mut store) = open_store();
    let columns = vec![("id".to_string(), TypeName::String), ("quantity".to_string(), TypeName::Int), ("available".to_string(), TypeName::Bool)];
    store.ensure_table("inventory", &columns).expect("ensure table");

    let mut row = nysm_store::Row::new();
    row.insert("id".to_string(), Value::String("sku-1".to_string()));
    row.insert("quantity".to_string(), Value::Int(42));
    row.insert("available".to_string(), Value::Bool(true));
    store.upsert_row("inventory", row).expect("upsert row");

    let rows = store.list_rows("inventory").expect("list rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("quantity"), Some(&Value::Int(42)));

    let queried = store
        .query("SELECT quantity FROM inventory WHERE id = ?1 ORDER BY id ASC COLLATE BINARY", &[Value::String("sku-1".to_string())])
        .expect("query");
    assert_eq!(queried.len(), 1);
    assert_eq!(queried[0].get("quantity"), Some(&Value::Int(42)));
}

#[test]
fn upsert_row_overwrites_existing_row_with_same_id() {
    let (_dir, mut store) = open_store();
    let columns = vec![("id".to_string(), TypeName::String), ("quantity".to_string(), TypeName::Int)];
    store.ensure_table("inventory", &columns).expect("ensure table");

    let mut first = nysm_store::Row::new();
    first.insert("id".to_string(), Value::String("sku-1".to_string()));
    first.insert("quantity".to_string(), Value::Int(10));
    store.upsert_row("inventory", first).expect("first upsert");

    let mut second = nysm_store::Row::new();
    second.insert("id".to_string(), Value::String("sku-1".to_string()));
    second.insert("quantity".to_string(), Value::Int(7));
    store.upsert_row("inventory", second).expect("second upsert");

    let rows = store.list_rows("inventory").expect("list rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("quantity"), Some(&Value::Int(7)));
}

#[test]
fn store_survives_reopen_against_the_same_file() {
    let dir = tempdir().expect("create tempdir");
    let config = SqliteStoreConfig {
        path: dir.path().join("nysm.sqlite3"),
        busy_timeout_ms: 1_000,
        journal_mode: nysm_store_sqlite::SqliteStoreMode::default(),
        sync_mode: nysm_store_sqlite::SqliteSyncMode::default(),
    };
    {
        let mut store = SqliteEventStore::open(&config).expect("open store");
        store.write_invocation(&sample_invocation(1, "flow-1")).expect("write invocation");
    }
    let store = SqliteEventStore::open(&config).expect("reopen store");
    let state = store.get_flow_state(&FlowToken::new("flow-1")).expect("flow state");
    assert_eq!(state.invocations.len(), 1);
}
