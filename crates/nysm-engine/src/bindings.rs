// crates/nysm-engine/src/bindings.rs
// ============================================================================
// Module: Binding Evaluation
// Description: When-clause path lookup, FilterSpec lowering, ArgExpr eval.
// Purpose: Turn a completion's data plus a sync rule's declarative clauses
//          into concrete `Value` bindings (spec §4.G, glossary "Binding").
// Dependencies: nysm-ir, nysm-query
// ============================================================================

//! ## Overview
//! spec.md describes when-clause `bindings` as "variable name to
//! JSON-pointer-like path, evaluated against the completion" without
//! fixing the path syntax. This implementation roots paths at a synthetic
//! object with two top-level fields, `args` (the triggering invocation's
//! arguments) and `result` (the completion's result), addressed by
//! dot-separated object keys — e.g. `"result.cart_id"` or
//! `"args.item_id"`. This choice is recorded in `DESIGN.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use nysm_ir::ArgExpr;
use nysm_ir::FilterSpec;
use nysm_ir::Value;
use nysm_query::Predicate;

use crate::error::EngineError;

// ============================================================================
// SECTION: When-Clause Path Lookup
// ============================================================================

/// Evaluates a dot-separated path against a completion's synthetic root
/// object (`{"args": ..., "result": ...}`), returning the resolved value.
///
/// # Errors
///
/// Returns [`EngineError::UnboundVariable`] if the path does not resolve
/// to a value (missing segment, or indexing into a non-object).
pub fn resolve_path(args: &Value, result: &Value, path: &str) -> Result<Value, EngineError> {
    let root = Value::object([("args".to_string(), args.clone()), ("result".to_string(), result.clone())]);
    let mut current = &root;
    for segment in path.split('.') {
        let Value::Object(fields) = current else {
            return Err(EngineError::UnboundVariable(path.to_string()));
        };
        current = fields.get(segment).ok_or_else(|| EngineError::UnboundVariable(path.to_string()))?;
    }
    Ok(current.clone())
}

/// Evaluates every `(variable, path)` pair in a when-clause's binding map.
///
/// # Errors
///
/// Returns [`EngineError::UnboundVariable`] if any path fails to resolve.
pub fn evaluate_when_bindings(args: &Value, result: &Value, bindings: &BTreeMap<String, String>) -> Result<BTreeMap<String, Value>, EngineError> {
    let mut resolved = BTreeMap::new();
    for (variable, path) in bindings {
        resolved.insert(variable.clone(), resolve_path(args, result, path)?);
    }
    Ok(resolved)
}

// ============================================================================
// SECTION: FilterSpec Lowering
// ============================================================================

/// Lowers a rule-authoring `FilterSpec` into a `nysm_query::Predicate`,
/// one-to-one per spec §4.D/§4.G.
#[must_use]
pub fn lower_filter(filter: &FilterSpec) -> Predicate {
    match filter {
        FilterSpec::Equals {
            field,
            literal,
        } => Predicate::Equals {
            field: field.clone(),
            literal: literal.clone(),
        },
        FilterSpec::BoundEquals {
            field,
            bound_var,
        } => Predicate::BoundEquals {
            field: field.clone(),
            bound_var: bound_var.clone(),
        },
        FilterSpec::And(items) => Predicate::And(items.iter().map(lower_filter).collect()),
    }
}

// ============================================================================
// SECTION: ArgExpr Evaluation
// ============================================================================

/// Evaluates a then-clause argument expression under a binding row.
///
/// # Errors
///
/// Returns [`EngineError::UnboundVariable`] if `expr` is an
/// [`ArgExpr::Var`] not present in `bindings`.
pub fn evaluate_arg_expr(expr: &ArgExpr, bindings: &BTreeMap<String, Value>) -> Result<Value, EngineError> {
    match expr {
        ArgExpr::Var {
            name,
        } => bindings.get(name).cloned().ok_or_else(|| EngineError::UnboundVariable(name.clone())),
        ArgExpr::Literal {
            value,
        } => Ok(value.clone()),
    }
}

/// Evaluates every argument in a then-clause's `args` map under a binding
/// row, producing the derived invocation's `Object` args value.
///
/// # Errors
///
/// Returns [`EngineError::UnboundVariable`] if any expression references
/// an unbound variable.
pub fn evaluate_then_args(args: &BTreeMap<String, ArgExpr>, bindings: &BTreeMap<String, Value>) -> Result<Value, EngineError> {
    let mut fields = BTreeMap::new();
    for (name, expr) in args {
        fields.insert(name.clone(), evaluate_arg_expr(expr, bindings)?);
    }
    Ok(Value::Object(fields))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_reaches_into_result_fields() {
        let args = Value::object([("item_id".to_string(), Value::String("widget".to_string()))]);
        let result = Value::object([("cart_id".to_string(), Value::String("cart-1".to_string()))]);
        let value = resolve_path(&args, &result, "result.cart_id").expect("resolves");
        assert_eq!(value, Value::String("cart-1".to_string()));
    }

    #[test]
    fn resolve_path_reaches_into_args_fields() {
        let args = Value::object([("item_id".to_string(), Value::String("widget".to_string()))]);
        let result = Value::object(std::iter::empty::<(String, Value)>());
        let value = resolve_path(&args, &result, "args.item_id").expect("resolves");
        assert_eq!(value, Value::String("widget".to_string()));
    }

    #[test]
    fn resolve_path_missing_segment_is_unbound_variable() {
        let args = Value::object(std::iter::empty::<(String, Value)>());
        let result = Value::object(std::iter::empty::<(String, Value)>());
        let err = resolve_path(&args, &result, "result.missing").unwrap_err();
        assert!(matches!(err, EngineError::UnboundVariable(_)));
    }

    #[test]
    fn lower_filter_maps_and_recursively() {
        let filter = FilterSpec::And(vec![
            FilterSpec::Equals {
                field: "item_id".to_string(),
                literal: Value::String("widget".to_string()),
            },
            FilterSpec::BoundEquals {
                field: "cart_id".to_string(),
                bound_var: "cart_id".to_string(),
            },
        ]);
        let predicate = lower_filter(&filter);
        assert!(matches!(predicate, Predicate::And(items) if items.len() == 2));
    }

    #[test]
    fn evaluate_then_args_substitutes_bound_and_literal_values() {
        let mut bindings = BTreeMap::new();
        bindings.insert("item_id".to_string(), Value::String("widget".to_string()));
        let mut args = BTreeMap::new();
        args.insert(
            "item_id".to_string(),
            ArgExpr::Var {
                name: "item_id".to_string(),
            },
        );
        args.insert(
            "quantity".to_string(),
            ArgExpr::Literal {
                value: Value::Int(3),
            },
        );
        let result = evaluate_then_args(&args, &bindings).expect("evaluates");
        assert_eq!(
            result,
            Value::object([("item_id".to_string(), Value::String("widget".to_string())), ("quantity".to_string(), Value::Int(3))])
        );
    }
}
