// crates/nysm-harness/src/scenario.rs
// ============================================================================
// Module: Scenario Document
// Description: The declarative scenario schema and its YAML loader
//              (spec §4.H, §6).
// Purpose: Turn a scenario file into typed setup/flow steps and assertions
//          the runner can drive without re-parsing anything itself.
// Dependencies: nysm-ir, serde, serde_yaml
// ============================================================================

//! ## Overview
//! A scenario is `{ name, specs[], flow_token?, setup, flow, assertions }`
//! (spec §4.H). `#[serde(deny_unknown_fields)]` throughout makes an unknown
//! top-level or nested field an [`HarnessError::InputRejection`] at load
//! time rather than a silently ignored typo (spec §6 "unknown scenario
//! field"). `load_scenario` additionally rejects a `final_state` assertion
//! whose `expect` map is empty: spec §9's first Open Question records that
//! the loader check, not "row exists" evaluation-time semantics, is the
//! authoritative contract.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use nysm_ir::Value;
use serde::Deserialize;

use crate::error::HarnessError;

// ============================================================================
// SECTION: Scenario
// ============================================================================

/// A declarative conformance scenario (spec §4.H).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Scenario name, used as the golden snapshot's `scenario_name`.
    pub name: String,
    /// Paths, relative to the scenario file, to spec-bundle documents
    /// (see [`crate::spec_bundle`]) exercised by this scenario.
    pub specs: Vec<String>,
    /// Fixed flow token the harness's flow-token generator returns on every
    /// call. Defaults to a token derived from `name` when absent.
    #[serde(default)]
    pub flow_token: Option<String>,
    /// Invocations driven to completion, one at a time, before `flow`.
    #[serde(default)]
    pub setup: Vec<ActionStep>,
    /// Invocations driven to completion, one at a time, after `setup`.
    pub flow: Vec<FlowStep>,
    /// Trace/state assertions checked once the flow has finished.
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

/// One setup invocation: an action and its arguments, with no inline
/// expectation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionStep {
    /// Fully qualified action URI to invoke, e.g. `"Cart.addItem"`.
    pub invoke: String,
    /// Invocation arguments.
    #[serde(default = "empty_object")]
    pub args: Value,
}

/// One flow invocation, optionally pinning its completion's shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowStep {
    /// Fully qualified action URI to invoke.
    pub invoke: String,
    /// Invocation arguments.
    #[serde(default = "empty_object")]
    pub args: Value,
    /// Expected completion shape, checked immediately after this step's
    /// invocation is driven to completion.
    #[serde(default)]
    pub expect: Option<ExpectClause>,
}

/// A flow step's inline completion expectation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectClause {
    /// Expected output case.
    pub case: String,
    /// Subset of the completion result expected to match (spec §4.H subset
    /// semantics).
    #[serde(default)]
    pub result: Option<Value>,
}

fn empty_object() -> Value {
    Value::object(std::iter::empty::<(String, Value)>())
}

// ============================================================================
// SECTION: Assertions
// ============================================================================

/// One of the four closed assertion kinds (spec §4.H).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Assertion {
    /// At least one invocation event matches `action`, and (if given) a
    /// subset of `args` matches that invocation's arguments.
    TraceContains {
        /// Action URI to match.
        action: String,
        /// Subset of expected arguments.
        #[serde(default)]
        args: Option<Value>,
    },
    /// Each listed action appears at least once, in the given relative
    /// order.
    TraceOrder {
        /// Ordered action URIs.
        actions: Vec<String>,
    },
    /// Invocations of `action` equal `count` exactly (`0` permitted).
    TraceCount {
        /// Action URI to count.
        action: String,
        /// Expected exact count.
        count: u64,
    },
    /// Exactly one row in `table` matches `where`, and has `expect` as a
    /// subset of its columns.
    FinalState {
        /// Concept state table name.
        table: String,
        /// Subset of columns identifying the row under test.
        #[serde(rename = "where")]
        where_clause: Value,
        /// Subset of columns the matched row must carry.
        expect: Value,
    },
}

// ============================================================================
// SECTION: Loader
// ============================================================================

/// Loads and validates a scenario document from `path`.
///
/// Returns the parsed scenario together with the directory `specs[]` paths
/// resolve against.
///
/// # Errors
///
/// Returns [`HarnessError::InputRejection`] if the file cannot be read, is
/// not valid YAML matching the scenario schema, or declares a
/// `final_state` assertion with an empty `expect` map.
pub fn load_scenario(path: &Path) -> Result<(Scenario, PathBuf), HarnessError> {
    let bytes = fs::read(path).map_err(|err| HarnessError::InputRejection(format!("reading scenario file {}: {err}", path.display())))?;
    let scenario: Scenario = serde_yaml::from_slice(&bytes).map_err(|err| HarnessError::InputRejection(format!("parsing scenario file {}: {err}", path.display())))?;
    validate_scenario(&scenario)?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok((scenario, base_dir))
}

/// Checks loader-time invariants not expressible in `serde`'s schema alone.
fn validate_scenario(scenario: &Scenario) -> Result<(), HarnessError> {
    if scenario.flow.is_empty() {
        return Err(HarnessError::InputRejection(format!("scenario '{}' declares no flow steps", scenario.name)));
    }
    for assertion in &scenario.assertions {
        if let Assertion::FinalState {
            table,
            expect,
            ..
        } = assertion
        {
            let is_empty = expect.as_object().is_some_and(std::collections::BTreeMap::is_empty);
            if is_empty {
                return Err(HarnessError::InputRejection(format!(
                    "scenario '{}': final_state assertion on table '{table}' has an empty expect map, which is rejected at load time rather than treated as a row-existence check",
                    scenario.name
                )));
            }
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_scenario(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(yaml.as_bytes()).expect("write scenario");
        file
    }

    #[test]
    fn loads_a_minimal_scenario() {
        let file = write_scenario(
            r"
name: cart-checkout
specs: [cart.json]
flow:
  - invoke: Cart.checkout
    args: {}
",
        );
        let (scenario, _base_dir) = load_scenario(file.path()).expect("scenario loads");
        assert_eq!(scenario.name, "cart-checkout");
        assert_eq!(scenario.flow.len(), 1);
    }

    #[test]
    fn rejects_unknown_top_level_field() {
        let file = write_scenario(
            r"
name: cart-checkout
specs: []
flow:
  - invoke: Cart.checkout
typo_field: true
",
        );
        let err = load_scenario(file.path()).unwrap_err();
        assert!(matches!(err, HarnessError::InputRejection(_)));
    }

    #[test]
    fn rejects_empty_final_state_expect() {
        let file = write_scenario(
            r"
name: cart-checkout
specs: []
flow:
  - invoke: Cart.checkout
assertions:
  - final_state:
      table: inventory
      where: {item_id: widget}
      expect: {}
",
        );
        let err = load_scenario(file.path()).unwrap_err();
        assert!(matches!(err, HarnessError::InputRejection(_)));
    }

    #[test]
    fn rejects_float_literal_in_args() {
        let file = write_scenario(
            r"
name: cart-checkout
specs: []
flow:
  - invoke: Cart.checkout
    args: {quantity: 1.5}
",
        );
        let err = load_scenario(file.path()).unwrap_err();
        assert!(matches!(err, HarnessError::InputRejection(_)));
    }
}
