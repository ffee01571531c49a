// crates/nysm-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Event Store
// Description: Durable EventStore + ConceptStateStore backed by SQLite WAL.
// Purpose: Reference implementation standing in for the out-of-scope
//          production storage driver; exercises SQL lowering and replay.
// Dependencies: crate::{config, error, schema}, nysm-ir, nysm-query,
//              nysm-store, rusqlite
// ============================================================================

//! ## Overview
//! Every write happens inside a single transaction so a `StoreError` leaves
//! the database exactly as it was before the call (spec §4.G "Failure
//! semantics"). `seq` uniqueness is checked across all three log tables: a
//! reused `seq` is rejected before any row is written, but a `seq` may
//! arrive out of mint order (a sync rule reserves a derived invocation's
//! `seq` before that invocation's own tick runs — spec §4.G step (c) — and
//! the two can interleave with other ticks in between).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use nysm_ir::ActionUri;
use nysm_ir::BindingHash;
use nysm_ir::Completion;
use nysm_ir::CompletionId;
use nysm_ir::FlowToken;
use nysm_ir::Invocation;
use nysm_ir::InvocationId;
use nysm_ir::OutputCase;
use nysm_ir::SecurityContext;
use nysm_ir::SpecHash;
use nysm_ir::SyncFiring;
use nysm_ir::SyncRuleId;
use nysm_ir::TypeName;
use nysm_ir::Value;
use nysm_store::ConceptStateStore;
use nysm_store::EventStore;
use nysm_store::FlowEvent;
use nysm_store::FlowState;
use nysm_store::Row;
use nysm_store::StoreError;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::config::SqliteStoreConfig;
use crate::error::SqliteStoreError;
use crate::schema;

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed event store with WAL support.
#[derive(Clone)]
pub struct SqliteEventStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteEventStore {
    /// Opens a `SQLite`-backed event store, creating the database file and
    /// its fixed log tables if absent.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the database cannot be opened or
    /// its schema initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        schema::initialize(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::Io("sqlite connection mutex poisoned".to_string()))
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection.execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection.execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
    Ok(connection)
}

// ============================================================================
// SECTION: Seq Uniqueness
// ============================================================================

fn seq_already_used(connection: &Connection, seq: i64) -> Result<bool, rusqlite::Error> {
    connection.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM invocations WHERE seq = ?1
            UNION ALL SELECT 1 FROM completions WHERE seq = ?1
            UNION ALL SELECT 1 FROM sync_firings WHERE seq = ?1
        )",
        params![seq],
        |row| row.get::<_, bool>(0),
    )
}

// ============================================================================
// SECTION: EventStore
// ============================================================================

impl EventStore for SqliteEventStore {
    fn write_invocation(&mut self, invocation: &Invocation) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let exists: Option<i64> = guard
            .query_row("SELECT 1 FROM invocations WHERE id = ?1", params![invocation.id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        if exists.is_some() {
            return Ok(());
        }
        if seq_already_used(&guard, invocation.seq).map_err(|err| StoreError::Io(err.to_string()))? {
            return Err(StoreError::SeqAlreadyUsed {
                seq: invocation.seq,
            });
        }
        let security_context = serde_json::to_vec(&invocation.security_context).map_err(|err| StoreError::Io(err.to_string()))?;
        guard
            .execute(
                "INSERT INTO invocations (id, flow_token, action_uri, args, seq, security_context, spec_hash, engine_version, ir_version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    invocation.id.as_str(),
                    invocation.flow_token.as_str(),
                    invocation.action_uri.as_str(),
                    invocation.args.canonical_encode(),
                    invocation.seq,
                    security_context,
                    invocation.spec_hash.as_str(),
                    invocation.engine_version.as_str(),
                    invocation.ir_version.as_str(),
                ],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }

    fn write_completion(&mut self, completion: &Completion) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let exists: Option<i64> = guard
            .query_row("SELECT 1 FROM completions WHERE id = ?1", params![completion.id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        if exists.is_some() {
            return Ok(());
        }
        let invocation_exists: Option<i64> = guard
            .query_row("SELECT 1 FROM invocations WHERE id = ?1", params![completion.invocation_id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        if invocation_exists.is_none() {
            return Err(StoreError::DanglingReference(format!(
                "completion {} references unknown invocation {}",
                completion.id, completion.invocation_id,
            )));
        }
        if seq_already_used(&guard, completion.seq).map_err(|err| StoreError::Io(err.to_string()))? {
            return Err(StoreError::SeqAlreadyUsed {
                seq: completion.seq,
            });
        }
        let security_context = serde_json::to_vec(&completion.security_context).map_err(|err| StoreError::Io(err.to_string()))?;
        guard
            .execute(
                "INSERT INTO completions (id, invocation_id, output_case, result, seq, security_context)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    completion.id.as_str(),
                    completion.invocation_id.as_str(),
                    completion.output_case.as_str(),
                    completion.result.canonical_encode(),
                    completion.seq,
                    security_context,
                ],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }

    fn try_fire(&mut self, completion_id: &CompletionId, sync_id: &SyncRuleId, binding_hash: &BindingHash, seq: i64) -> Result<Option<i64>, StoreError> {
        let guard = self.lock()?;
        let rows = guard
            .execute(
                "INSERT OR IGNORE INTO sync_firings (completion_id, sync_id, binding_hash, seq) VALUES (?1, ?2, ?3, ?4)",
                params![completion_id.as_str(), sync_id.as_str(), binding_hash.as_str(), seq],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        if rows > 0 {
            Ok(Some(guard.last_insert_rowid()))
        } else {
            Ok(None)
        }
    }

    fn add_provenance(&mut self, sync_firing_id: i64, invocation_id: &InvocationId) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO provenance_edges (sync_firing_id, invocation_id) VALUES (?1, ?2)",
                params![sync_firing_id, invocation_id.as_str()],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }

    fn list_flow_tokens(&self) -> Result<Vec<FlowToken>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare("SELECT DISTINCT flow_token FROM invocations ORDER BY flow_token ASC COLLATE BINARY")
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let rows = stmt
            .query_map(params![], |row| row.get::<_, String>(0))
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let mut tokens = Vec::new();
        for row in rows {
            tokens.push(FlowToken::new(row.map_err(|err| StoreError::Io(err.to_string()))?));
        }
        Ok(tokens)
    }

    fn replay_flow(&self, flow_token: &FlowToken) -> Result<Vec<FlowEvent>, StoreError> {
        let state = self.get_flow_state(flow_token)?;
        let mut events: Vec<FlowEvent> = Vec::with_capacity(state.invocations.len() + state.completions.len());
        for inv in state.invocations {
            events.push(FlowEvent::Invocation {
                seq: inv.seq,
                id: inv.id,
                action_uri: inv.action_uri,
                args: inv.args,
                security_context: inv.security_context,
            });
        }
        for comp in state.completions {
            events.push(FlowEvent::Completion {
                seq: comp.seq,
                id: comp.id,
                invocation_id: comp.invocation_id,
                output_case: comp.output_case,
                result: comp.result,
                security_context: comp.security_context,
            });
        }
        events.sort_by_key(nysm_store::order_key);
        Ok(events)
    }

    fn get_flow_state(&self, flow_token: &FlowToken) -> Result<FlowState, StoreError> {
        let guard = self.lock()?;

        let mut inv_stmt = guard
            .prepare(
                "SELECT id, flow_token, action_uri, args, seq, security_context, spec_hash, engine_version, ir_version
                 FROM invocations WHERE flow_token = ?1 ORDER BY seq ASC",
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let invocations = inv_stmt
            .query_map(params![flow_token.as_str()], map_invocation_row)
            .map_err(|err| StoreError::Io(err.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| StoreError::Io(err.to_string()))?;

        let mut comp_stmt = guard
            .prepare(
                "SELECT c.id, c.invocation_id, c.output_case, c.result, c.seq, c.security_context
                 FROM completions c JOIN invocations i ON c.invocation_id = i.id
                 WHERE i.flow_token = ?1 ORDER BY c.seq ASC",
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let completions = comp_stmt
            .query_map(params![flow_token.as_str()], map_completion_row)
            .map_err(|err| StoreError::Io(err.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| StoreError::Io(err.to_string()))?;

        let mut firing_stmt = guard
            .prepare(
                "SELECT f.id, f.completion_id, f.sync_id, f.binding_hash, f.seq
                 FROM sync_firings f JOIN completions c ON f.completion_id = c.id
                 JOIN invocations i ON c.invocation_id = i.id
                 WHERE i.flow_token = ?1 ORDER BY f.seq ASC",
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let sync_firings = firing_stmt
            .query_map(params![flow_token.as_str()], map_firing_row)
            .map_err(|err| StoreError::Io(err.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| StoreError::Io(err.to_string()))?;

        let completed: std::collections::BTreeSet<&str> = completions.iter().map(|c: &Completion| c.invocation_id.as_str()).collect();
        let is_complete = invocations.iter().all(|inv: &Invocation| completed.contains(inv.id.as_str()));

        Ok(FlowState {
            invocations,
            completions,
            sync_firings,
            is_complete,
        })
    }

    fn query(&self, sql: &str, params_slice: &[Value]) -> Result<Vec<Row>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard.prepare(sql).map_err(|err| StoreError::Query(err.to_string()))?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();
        let sql_params: Vec<rusqlite::types::Value> = params_slice.iter().map(value_to_sql).collect::<Result<_, _>>()?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(sql_params), |row| {
                let mut out = Row::new();
                for (index, name) in column_names.iter().enumerate() {
                    let raw: rusqlite::types::Value = row.get(index)?;
                    out.insert(name.clone(), sql_to_value(&raw));
                }
                Ok(out)
            })
            .map_err(|err| StoreError::Query(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Query(err.to_string()))
    }
}

fn map_invocation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Invocation> {
    let args_bytes: Vec<u8> = row.get(3)?;
    let security_context_bytes: Vec<u8> = row.get(5)?;
    Ok(Invocation {
        id: InvocationId::new(row.get::<_, String>(0)?),
        flow_token: FlowToken::new(row.get::<_, String>(1)?),
        action_uri: ActionUri::new(row.get::<_, String>(2)?),
        args: Value::decode_for_replay(&args_bytes).unwrap_or(Value::Null),
        seq: row.get(4)?,
        security_context: serde_json::from_slice::<SecurityContext>(&security_context_bytes).unwrap_or_default(),
        spec_hash: SpecHash::new(row.get::<_, String>(6)?),
        engine_version: nysm_ir::EngineVersion::new(row.get::<_, String>(7)?),
        ir_version: nysm_ir::IrVersion::new(row.get::<_, String>(8)?),
    })
}

fn map_completion_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Completion> {
    let result_bytes: Vec<u8> = row.get(3)?;
    let security_context_bytes: Vec<u8> = row.get(5)?;
    Ok(Completion {
        id: CompletionId::new(row.get::<_, String>(0)?),
        invocation_id: InvocationId::new(row.get::<_, String>(1)?),
        output_case: OutputCase::new(row.get::<_, String>(2)?),
        result: Value::decode_for_replay(&result_bytes).unwrap_or(Value::Null),
        seq: row.get(4)?,
        security_context: serde_json::from_slice::<SecurityContext>(&security_context_bytes).unwrap_or_default(),
    })
}

fn map_firing_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncFiring> {
    Ok(SyncFiring {
        id: row.get(0)?,
        completion_id: CompletionId::new(row.get::<_, String>(1)?),
        sync_id: SyncRuleId::new(row.get::<_, String>(2)?),
        binding_hash: BindingHash::new(row.get::<_, String>(3)?),
        seq: row.get(4)?,
    })
}

fn value_to_sql(value: &Value) -> Result<rusqlite::types::Value, StoreError> {
    match value {
        Value::Null => Ok(rusqlite::types::Value::Null),
        Value::String(s) => Ok(rusqlite::types::Value::Text(s.clone())),
        Value::Int(n) => Ok(rusqlite::types::Value::Integer(*n)),
        Value::Bool(b) => Ok(rusqlite::types::Value::Integer(i64::from(*b))),
        Value::Array(_) | Value::Object(_) => Err(StoreError::Query("array/object values cannot be bound as SQL parameters".to_string())),
    }
}

fn sql_to_value(raw: &rusqlite::types::Value) -> Value {
    match raw {
        rusqlite::types::Value::Null => Value::Null,
        rusqlite::types::Value::Integer(n) => Value::Int(*n),
        rusqlite::types::Value::Real(_) => Value::Null,
        rusqlite::types::Value::Text(s) => Value::String(s.clone()),
        rusqlite::types::Value::Blob(bytes) => Value::decode_for_replay(bytes).unwrap_or(Value::Null),
    }
}

// ============================================================================
// SECTION: ConceptStateStore
// ============================================================================

impl ConceptStateStore for SqliteEventStore {
    fn ensure_table(&mut self, table: &str, columns: &[(String, TypeName)]) -> Result<(), StoreError> {
        let guard = self.lock()?;
        schema::ensure_concept_table(&guard, table, columns).map_err(StoreError::from)
    }

    fn upsert_row(&mut self, table: &str, row: Row) -> Result<(), StoreError> {
        schema::validate_identifier(table).map_err(StoreError::from)?;
        let id = row
            .get("id")
            .cloned()
            .ok_or_else(|| StoreError::Query(format!("row written to table '{table}' is missing an 'id' column")))?;
        let mut columns = Vec::with_capacity(row.len());
        let mut placeholders = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (index, (column, value)) in row.iter().enumerate() {
            schema::validate_identifier(column).map_err(StoreError::from)?;
            columns.push(column.clone());
            placeholders.push(format!("?{}", index + 1));
            values.push(value_to_sql(value)?);
        }
        let update_clause = columns
            .iter()
            .filter(|c| *c != "id")
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = if update_clause.is_empty() {
            format!("INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT(id) DO NOTHING", columns.join(", "), placeholders.join(", "))
        } else {
            format!(
                "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {update_clause}",
                columns.join(", "),
                placeholders.join(", "),
            )
        };
        let _ = id;
        let guard = self.lock()?;
        guard.execute(&sql, rusqlite::params_from_iter(values)).map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }

    fn list_rows(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        schema::validate_identifier(table).map_err(StoreError::from)?;
        self.query(&format!("SELECT * FROM {table} ORDER BY id ASC COLLATE BINARY"), &[])
    }
}
