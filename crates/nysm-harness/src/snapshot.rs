// crates/nysm-harness/src/snapshot.rs
// ============================================================================
// Module: Golden Snapshot
// Description: Builds and compares a scenario's golden trace snapshot
//              (spec §4.H, §6).
// Purpose: Give a scenario run a byte-exact, canonically-encoded fixture so
//          drift in trace shape or ordering is caught as a diff rather than
//          silently tolerated.
// Dependencies: nysm-ir, nysm-store
// ============================================================================

//! ## Overview
//! The golden snapshot format is `{scenario_name, flow_token?,
//! trace:[{type, seq, action_uri?, args?, output_case?, result?}]}`,
//! encoded with the canonical encoder so byte comparison is well-defined
//! (spec §6). [`build_snapshot`] turns a [`ScenarioOutcome`] into that
//! value; [`write_snapshot`] and [`compare_snapshot`] implement the
//! `--update` and verify modes spec §4.H calls for.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use nysm_store::FlowEvent;

use crate::error::HarnessError;
use crate::run::ScenarioOutcome;
use nysm_ir::Value;

// ============================================================================
// SECTION: Construction
// ============================================================================

/// Builds the golden snapshot value for a driven scenario outcome.
#[must_use]
pub fn build_snapshot(scenario_name: &str, outcome: &ScenarioOutcome) -> Value {
    let trace = outcome.trace.iter().map(encode_event).collect();
    Value::object([
        ("scenario_name".to_string(), Value::String(scenario_name.to_string())),
        ("flow_token".to_string(), Value::String(outcome.flow_token.as_str().to_string())),
        ("trace".to_string(), Value::Array(trace)),
    ])
}

/// Encodes one trace event in the golden snapshot's flat field shape.
fn encode_event(event: &FlowEvent) -> Value {
    match event {
        FlowEvent::Invocation {
            seq,
            action_uri,
            args,
            ..
        } => Value::object([
            ("type".to_string(), Value::String("invocation".to_string())),
            ("seq".to_string(), Value::Int(*seq)),
            ("action_uri".to_string(), Value::String(action_uri.as_str().to_string())),
            ("args".to_string(), args.clone()),
        ]),
        FlowEvent::Completion {
            seq,
            output_case,
            result,
            ..
        } => Value::object([
            ("type".to_string(), Value::String("completion".to_string())),
            ("seq".to_string(), Value::Int(*seq)),
            ("output_case".to_string(), Value::String(output_case.as_str().to_string())),
            ("result".to_string(), result.clone()),
        ]),
    }
}

// ============================================================================
// SECTION: Persistence And Comparison
// ============================================================================

/// Writes `snapshot`'s canonical encoding to `path`, overwriting any
/// existing file (`--update` mode).
///
/// # Errors
///
/// Returns [`HarnessError::InputRejection`] if `path` cannot be written.
pub fn write_snapshot(path: &Path, snapshot: &Value) -> Result<(), HarnessError> {
    fs::write(path, snapshot.canonical_encode()).map_err(|err| HarnessError::InputRejection(format!("writing golden snapshot {}: {err}", path.display())))
}

/// Compares `snapshot`'s canonical encoding against the bytes on disk at
/// `path`, byte-exactly.
///
/// # Errors
///
/// Returns [`HarnessError::InputRejection`] if `path` cannot be read, or
/// [`HarnessError::DeterminismFailure`] if the encodings differ.
pub fn compare_snapshot(path: &Path, snapshot: &Value) -> Result<(), HarnessError> {
    let golden = fs::read(path).map_err(|err| HarnessError::InputRejection(format!("reading golden snapshot {}: {err}", path.display())))?;
    let actual = snapshot.canonical_encode();
    if golden == actual {
        Ok(())
    } else {
        Err(HarnessError::DeterminismFailure(format!("golden snapshot mismatch against {}", path.display())))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use nysm_ir::ActionUri;
    use nysm_ir::FlowToken;
    use nysm_ir::InvocationId;
    use nysm_ir::SecurityContext;
    use tempfile::NamedTempFile;

    use super::*;

    fn sample_outcome() -> ScenarioOutcome {
        ScenarioOutcome {
            flow_token: FlowToken::new("flow-1"),
            trace: vec![FlowEvent::Invocation {
                seq: 1,
                id: InvocationId::new("inv-1"),
                action_uri: ActionUri::new("Cart.checkout"),
                args: Value::object(std::iter::empty::<(String, Value)>()),
                security_context: SecurityContext::default(),
            }],
        }
    }

    #[test]
    fn round_trips_through_write_and_compare() {
        let snapshot = build_snapshot("cart-checkout", &sample_outcome());
        let file = NamedTempFile::new().expect("create temp file");
        write_snapshot(file.path(), &snapshot).expect("write snapshot");
        compare_snapshot(file.path(), &snapshot).expect("snapshot matches itself");
    }

    #[test]
    fn detects_a_mismatch() {
        let snapshot = build_snapshot("cart-checkout", &sample_outcome());
        let file = NamedTempFile::new().expect("create temp file");
        write_snapshot(file.path(), &snapshot).expect("write snapshot");

        let mut different_outcome = sample_outcome();
        different_outcome.flow_token = FlowToken::new("flow-2");
        let different_snapshot = build_snapshot("cart-checkout", &different_outcome);

        let err = compare_snapshot(file.path(), &different_snapshot).unwrap_err();
        assert!(matches!(err, HarnessError::DeterminismFailure(_)));
    }
}
