// crates/nysm-harness/src/assertions.rs
// ============================================================================
// Module: Assertion Evaluation
// Description: Evaluates the four closed trace/state assertion kinds
//              (spec §4.H) against a driven scenario's trace and store.
// Purpose: Turn a scenario's declared assertions into pass/fail, with
//          subset semantics for `trace_contains`/`final_state` so a
//          scenario can pin only the fields it cares about (spec §4.H
//          "Subset semantics").
// Dependencies: nysm-ir, nysm-store
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use nysm_ir::Value;
use nysm_store::ConceptStateStore;
use nysm_store::FlowEvent;

use crate::error::HarnessError;
use crate::scenario::Assertion;

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Checks every assertion in `assertions` against `trace` and `store`,
/// failing on the first unmet one.
///
/// # Errors
///
/// Returns [`HarnessError::AssertionFailure`] on the first assertion that
/// does not hold, or [`HarnessError::Store`] if a `final_state` assertion's
/// row lookup fails.
pub fn evaluate_assertions(assertions: &[Assertion], trace: &[FlowEvent], store: &dyn ConceptStateStore) -> Result<(), HarnessError> {
    for assertion in assertions {
        evaluate_one(assertion, trace, store)?;
    }
    Ok(())
}

/// Checks a single assertion.
fn evaluate_one(assertion: &Assertion, trace: &[FlowEvent], store: &dyn ConceptStateStore) -> Result<(), HarnessError> {
    match assertion {
        Assertion::TraceContains {
            action,
            args,
        } => check_trace_contains(trace, action, args.as_ref()),
        Assertion::TraceOrder {
            actions,
        } => check_trace_order(trace, actions),
        Assertion::TraceCount {
            action,
            count,
        } => check_trace_count(trace, action, *count),
        Assertion::FinalState {
            table,
            where_clause,
            expect,
        } => check_final_state(store, table, where_clause, expect),
    }
}

/// `trace_contains(action, args?)`: at least one invocation event matches
/// `action`, and `args`, if given, is a subset of that invocation's args.
fn check_trace_contains(trace: &[FlowEvent], action: &str, expected_args: Option<&Value>) -> Result<(), HarnessError> {
    let matches = trace.iter().any(|event| match event {
        FlowEvent::Invocation {
            action_uri,
            args,
            ..
        } if action_uri.as_str() == action => expected_args.is_none_or(|expected| is_superset(args, expected)),
        _ => false,
    });
    if matches {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailure(format!("trace_contains: no invocation of '{action}' matched the expected args")))
    }
}

/// `trace_order(actions)`: each listed action appears at least once, in the
/// given relative order, as a subsequence of the trace's invocation events.
fn check_trace_order(trace: &[FlowEvent], actions: &[String]) -> Result<(), HarnessError> {
    let mut remaining = actions.iter();
    let Some(mut next) = remaining.next() else {
        return Ok(());
    };
    for event in trace {
        let FlowEvent::Invocation {
            action_uri,
            ..
        } = event
        else {
            continue;
        };
        if action_uri.as_str() == next.as_str() {
            match remaining.next() {
                Some(following) => next = following,
                None => return Ok(()),
            }
        }
    }
    Err(HarnessError::AssertionFailure(format!("trace_order: actions {actions:?} did not all appear in the expected relative order")))
}

/// `trace_count(action, count)`: invocations of `action` equal `count`
/// exactly.
fn check_trace_count(trace: &[FlowEvent], action: &str, expected_count: u64) -> Result<(), HarnessError> {
    let actual = trace
        .iter()
        .filter(|event| matches!(event, FlowEvent::Invocation { action_uri, .. } if action_uri.as_str() == action))
        .count();
    let actual = u64::try_from(actual).unwrap_or(u64::MAX);
    if actual == expected_count {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailure(format!("trace_count: '{action}' invoked {actual} time(s), expected {expected_count}")))
    }
}

/// `final_state(table, where, expect)`: exactly one row in `table` matches
/// `where`, and has `expect` as a subset of its columns.
fn check_final_state(store: &dyn ConceptStateStore, table: &str, where_clause: &Value, expect: &Value) -> Result<(), HarnessError> {
    let rows = store.list_rows(table)?;
    let matching: Vec<&BTreeMap<String, Value>> = rows.iter().filter(|row| is_superset(&Value::Object((*row).clone()), where_clause)).collect();
    match matching.as_slice() {
        [] => Err(HarnessError::AssertionFailure(format!("final_state: no row in '{table}' matched {where_clause:?}"))),
        [row] => {
            if is_superset(&Value::Object((*row).clone()), expect) {
                Ok(())
            } else {
                Err(HarnessError::AssertionFailure(format!("final_state: matched row in '{table}' did not have {expect:?} as a subset of its columns")))
            }
        }
        _ => Err(HarnessError::AssertionFailure(format!("final_state: {} rows in '{table}' matched {where_clause:?}, expected exactly one", matching.len()))),
    }
}

/// Returns whether every field in `expected` is present in `actual` with an
/// equal value. Both must be [`Value::Object`]; any other shape is not a
/// superset of anything.
fn is_superset(actual: &Value, expected: &Value) -> bool {
    let (Some(actual_fields), Some(expected_fields)) = (actual.as_object(), expected.as_object()) else {
        return false;
    };
    expected_fields.iter().all(|(key, value)| actual_fields.get(key) == Some(value))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use nysm_ir::ActionUri;
    use nysm_ir::CompletionId;
    use nysm_ir::InvocationId;
    use nysm_ir::OutputCase;
    use nysm_ir::SecurityContext;

    use super::*;

    fn invocation_event(action: &str, args: Value) -> FlowEvent {
        FlowEvent::Invocation {
            seq: 1,
            id: InvocationId::new("inv-1"),
            action_uri: ActionUri::new(action),
            args,
            security_context: SecurityContext::default(),
        }
    }

    #[test]
    fn trace_contains_matches_a_subset_of_args() {
        let args = Value::object([("item_id".to_string(), Value::String("widget".to_string())), ("quantity".to_string(), Value::Int(3))]);
        let trace = vec![invocation_event("Cart.addItem", args)];
        let expected = Value::object([("item_id".to_string(), Value::String("widget".to_string()))]);
        check_trace_contains(&trace, "Cart.addItem", Some(&expected)).expect("subset matches");
    }

    #[test]
    fn trace_contains_fails_on_mismatched_field() {
        let args = Value::object([("item_id".to_string(), Value::String("widget".to_string()))]);
        let trace = vec![invocation_event("Cart.addItem", args)];
        let expected = Value::object([("item_id".to_string(), Value::String("gadget".to_string()))]);
        assert!(check_trace_contains(&trace, "Cart.addItem", Some(&expected)).is_err());
    }

    #[test]
    fn trace_order_accepts_a_subsequence_with_gaps() {
        let trace = vec![
            invocation_event("Cart.addItem", Value::object(std::iter::empty::<(String, Value)>())),
            invocation_event("Cart.checkout", Value::object(std::iter::empty::<(String, Value)>())),
            invocation_event("Inventory.reserve", Value::object(std::iter::empty::<(String, Value)>())),
        ];
        let actions = vec!["Cart.addItem".to_string(), "Inventory.reserve".to_string()];
        check_trace_order(&trace, &actions).expect("subsequence matches");
    }

    #[test]
    fn trace_order_fails_when_out_of_order() {
        let trace = vec![
            invocation_event("Inventory.reserve", Value::object(std::iter::empty::<(String, Value)>())),
            invocation_event("Cart.addItem", Value::object(std::iter::empty::<(String, Value)>())),
        ];
        let actions = vec!["Cart.addItem".to_string(), "Inventory.reserve".to_string()];
        assert!(check_trace_order(&trace, &actions).is_err());
    }

    #[test]
    fn trace_count_counts_only_matching_invocations() {
        let trace = vec![
            invocation_event("Inventory.reserve", Value::object(std::iter::empty::<(String, Value)>())),
            invocation_event("Inventory.reserve", Value::object(std::iter::empty::<(String, Value)>())),
            FlowEvent::Completion {
                seq: 2,
                id: CompletionId::new("comp-1"),
                invocation_id: InvocationId::new("inv-1"),
                output_case: OutputCase::new("Reserved"),
                result: Value::object(std::iter::empty::<(String, Value)>()),
                security_context: SecurityContext::default(),
            },
        ];
        check_trace_count(&trace, "Inventory.reserve", 2).expect("count matches");
        assert!(check_trace_count(&trace, "Inventory.reserve", 1).is_err());
    }
}
