// crates/nysm-cli/src/main.rs
// ============================================================================
// Module: NYSM CLI Entry Point
// Description: Command dispatcher for `run`/`replay`/`test`.
// Purpose: Give the engine and conformance harness a thin, non-normative
//          command-line front end (spec §6 "CLI surface").
// Dependencies: clap, nysm-engine, nysm-harness, nysm-ir, nysm-store,
//              nysm-store-sqlite, serde_json, thiserror.
// ============================================================================

//! ## Overview
//! `nysm` is deliberately thin: it does not implement the full `compile`/
//! `validate`/`run`/`replay`/`test`/`trace` contract spec.md assigns to an
//! external front-end, only enough to drive the demo handler registry
//! through a scenario (`run`), replay a durable flow (`replay`), and check
//! a scenario's assertions and golden snapshot (`test`). All three print
//! the stable error envelope (`{status, data?, error?}`, spec §6) to
//! stdout and exit per the §6 convention: `0` success, `1` user-visible
//! failure (assertion/determinism), `2` command error.

// ============================================================================
// SECTION: Imports
// ============================================================================

mod handlers;

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use nysm_harness::HarnessError;
use nysm_ir::FlowToken;
use nysm_store::EventStore;
use nysm_store::InMemoryEventStore;
use nysm_store_sqlite::SqliteStoreConfig;
use nysm_store_sqlite::SqliteEventStore;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "nysm", arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive a scenario's setup/flow through a fresh in-memory engine.
    Run(RunArgs),
    /// Replay a flow from a durable `SQLite` store.
    Replay(ReplayArgs),
    /// Run the conformance harness against a scenario.
    Test(TestArgs),
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the scenario YAML file.
    scenario: PathBuf,
}

/// Arguments for the `replay` command.
#[derive(Args, Debug)]
struct ReplayArgs {
    /// Path to the `SQLite` database file.
    db: PathBuf,
    /// Flow token to replay.
    flow_token: String,
}

/// Arguments for the `test` command.
#[derive(Args, Debug)]
struct TestArgs {
    /// Path to the scenario YAML file.
    scenario: PathBuf,
    /// Regenerate the golden snapshot instead of comparing against it.
    #[arg(long)]
    update: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper, carrying the exit code its origin implies.
#[derive(Debug, Error)]
enum CliError {
    /// The scenario, its spec bundles, or a driven step were rejected;
    /// exits `2`.
    #[error("{0}")]
    Command(String),
    /// A declared assertion or golden-snapshot comparison did not hold;
    /// exits `1`.
    #[error("{0}")]
    Failure(String),
}

impl CliError {
    /// Classifies a [`HarnessError`] into a command or user-visible
    /// failure, per spec §6's exit-code convention.
    fn from_harness(err: HarnessError) -> Self {
        match err {
            HarnessError::AssertionFailure(_) | HarnessError::DeterminismFailure(_) => Self::Failure(err.to_string()),
            HarnessError::InputRejection(_) | HarnessError::Engine(_) | HarnessError::Store(_) => Self::Command(err.to_string()),
        }
    }

    /// The exit code this error implies.
    const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Command(_) => ExitCode::from(2),
            Self::Failure(_) => ExitCode::from(1),
        }
    }
}

type CliResult<T> = Result<T, CliError>;

/// The stable `{status, data?, error?}` envelope (spec §6).
#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Envelope<T> {
    /// A successful outcome.
    Ok {
        /// Command-specific payload.
        data: T,
    },
    /// A failed outcome.
    Error {
        /// Error detail.
        error: ErrorDetail,
    },
}

/// The error envelope's inner detail.
#[derive(Serialize)]
struct ErrorDetail {
    /// Stable error code.
    code: &'static str,
    /// Human-readable message.
    message: String,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(code) => code,
        Err(err) => emit_error(&err),
    }
}

/// Dispatches the selected subcommand.
fn dispatch(command: Commands) -> CliResult<ExitCode> {
    match command {
        Commands::Run(args) => command_run(&args),
        Commands::Replay(args) => command_replay(&args),
        Commands::Test(args) => command_test(&args),
    }
}

// ============================================================================
// SECTION: Run Command
// ============================================================================

/// Executes the `run` command: drives a scenario to completion and prints
/// its trace, without evaluating assertions.
fn command_run(args: &RunArgs) -> CliResult<ExitCode> {
    let (scenario, base_dir) = nysm_harness::load_scenario(&args.scenario).map_err(CliError::from_harness)?;
    let bundles = nysm_harness::load_spec_bundles(&base_dir, &scenario.specs).map_err(CliError::from_harness)?;
    let (outcome, _engine) = nysm_harness::run_scenario(&scenario, &bundles, InMemoryEventStore::new(), handlers::build_handler_registry()).map_err(CliError::from_harness)?;

    let snapshot = nysm_harness::build_snapshot(&scenario.name, &outcome);
    write_envelope_ok(&snapshot_to_json(&snapshot))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Replay Command
// ============================================================================

/// Executes the `replay` command: opens a durable store and prints a
/// flow's event list.
fn command_replay(args: &ReplayArgs) -> CliResult<ExitCode> {
    let config = SqliteStoreConfig {
        path: args.db.clone(),
        busy_timeout_ms: 5_000,
        journal_mode: nysm_store_sqlite::SqliteStoreMode::default(),
        sync_mode: nysm_store_sqlite::SqliteSyncMode::default(),
    };
    let store = SqliteEventStore::open(&config).map_err(|err| CliError::Command(err.to_string()))?;
    let flow_token = FlowToken::new(args.flow_token.clone());
    let trace = store.replay_flow(&flow_token).map_err(|err| CliError::Command(err.to_string()))?;

    let events: Vec<serde_json::Value> = trace.iter().map(event_to_json).collect();
    write_envelope_ok(&serde_json::Value::Array(events))?;
    Ok(ExitCode::SUCCESS)
}

/// Renders one [`nysm_store::FlowEvent`] as a JSON value for `replay`
/// output.
fn event_to_json(event: &nysm_store::FlowEvent) -> serde_json::Value {
    match event {
        nysm_store::FlowEvent::Invocation {
            seq,
            id,
            action_uri,
            args,
            ..
        } => serde_json::json!({
            "type": "invocation",
            "seq": seq,
            "id": id.as_str(),
            "action_uri": action_uri.as_str(),
            "args": value_to_json(args),
        }),
        nysm_store::FlowEvent::Completion {
            seq,
            id,
            invocation_id,
            output_case,
            result,
            ..
        } => serde_json::json!({
            "type": "completion",
            "seq": seq,
            "id": id.as_str(),
            "invocation_id": invocation_id.as_str(),
            "output_case": output_case.as_str(),
            "result": value_to_json(result),
        }),
    }
}

// ============================================================================
// SECTION: Test Command
// ============================================================================

/// Executes the `test` command: runs the harness's assertions and, unless
/// `--update` is given, compares the golden snapshot.
fn command_test(args: &TestArgs) -> CliResult<ExitCode> {
    let (scenario, base_dir) = nysm_harness::load_scenario(&args.scenario).map_err(CliError::from_harness)?;
    let bundles = nysm_harness::load_spec_bundles(&base_dir, &scenario.specs).map_err(CliError::from_harness)?;
    let (outcome, mut engine) = nysm_harness::run_scenario(&scenario, &bundles, InMemoryEventStore::new(), handlers::build_handler_registry()).map_err(CliError::from_harness)?;

    nysm_harness::evaluate_assertions(&scenario.assertions, &outcome.trace, &*engine.store_mut()).map_err(CliError::from_harness)?;

    let snapshot = nysm_harness::build_snapshot(&scenario.name, &outcome);
    let golden_path = golden_snapshot_path(&args.scenario);
    if args.update {
        nysm_harness::write_snapshot(&golden_path, &snapshot).map_err(CliError::from_harness)?;
    } else if golden_path.exists() {
        nysm_harness::compare_snapshot(&golden_path, &snapshot).map_err(CliError::from_harness)?;
    }

    write_envelope_ok(&snapshot_to_json(&snapshot))?;
    Ok(ExitCode::SUCCESS)
}

/// Derives a scenario file's golden snapshot path: same directory, same
/// stem, `.golden` extension.
fn golden_snapshot_path(scenario_path: &std::path::Path) -> PathBuf {
    scenario_path.with_extension("golden")
}

// ============================================================================
// SECTION: Value / Output Helpers
// ============================================================================

/// Converts a canonical [`nysm_ir::Value`] into a `serde_json::Value` for
/// CLI output. The two algebras are not identical (`Value` has no float
/// variant; JSON numbers are never fractional here), so this is a direct
/// structural walk rather than a `serde` round-trip.
fn value_to_json(value: &nysm_ir::Value) -> serde_json::Value {
    match value {
        nysm_ir::Value::Null => serde_json::Value::Null,
        nysm_ir::Value::String(s) => serde_json::Value::String(s.clone()),
        nysm_ir::Value::Int(n) => serde_json::Value::Number((*n).into()),
        nysm_ir::Value::Bool(b) => serde_json::Value::Bool(*b),
        nysm_ir::Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        nysm_ir::Value::Object(fields) => serde_json::Value::Object(fields.iter().map(|(key, value)| (key.clone(), value_to_json(value))).collect()),
    }
}

/// Converts a golden snapshot `Value` into JSON for CLI output.
fn snapshot_to_json(snapshot: &nysm_ir::Value) -> serde_json::Value {
    value_to_json(snapshot)
}

/// Writes a successful envelope to stdout.
fn write_envelope_ok(data: &serde_json::Value) -> CliResult<()> {
    let envelope = Envelope::Ok {
        data: data.clone(),
    };
    write_stdout_json(&envelope)
}

/// Serializes and writes an envelope to stdout.
fn write_stdout_json<T: Serialize>(envelope: &Envelope<T>) -> CliResult<()> {
    let text = serde_json::to_string_pretty(envelope).map_err(|err| CliError::Command(err.to_string()))?;
    writeln!(std::io::stdout(), "{text}").map_err(|err| CliError::Command(err.to_string()))
}

/// Emits an error envelope to stdout and returns the matching exit code.
fn emit_error(err: &CliError) -> ExitCode {
    let code = match err {
        CliError::Command(_) => "E002",
        CliError::Failure(_) => "E001",
    };
    let envelope: Envelope<()> = Envelope::Error {
        error: ErrorDetail {
            code,
            message: err.to_string(),
        },
    };
    if let Ok(text) = serde_json::to_string_pretty(&envelope) {
        let _ = writeln!(std::io::stdout(), "{text}");
    }
    err.exit_code()
}
