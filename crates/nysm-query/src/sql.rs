// crates/nysm-query/src/sql.rs
// ============================================================================
// Module: SQL Lowering
// Description: Parameterized SQL emitter with deterministic ordering.
// Purpose: Turn a Query IR tree into `(sql_text, params)` safe to execute
//          against a relational store.
// Dependencies: nysm-ir, crate::ir, thiserror
// ============================================================================

//! ## Overview
//! `compile` never interpolates a value into SQL text: every literal and
//! every bound variable becomes a `?` placeholder with its value appended
//! to `params`. Table and column identifiers are not parameterizable and
//! must match `[A-Za-z_][A-Za-z0-9_]*`; every emitted query ends with
//! `ORDER BY id ASC COLLATE BINARY` (spec §4.E).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use nysm_ir::Value;
use thiserror::Error;

use crate::ir::Predicate;
use crate::ir::Query;
use crate::ir::Select;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while lowering a [`Query`] to SQL.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlError {
    /// A table or column identifier did not match `[A-Za-z_][A-Za-z0-9_]*`.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// A `BoundEquals` predicate referenced a variable with no bound value.
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
    /// A literal or bound value was an `Array` or `Object`, which has no
    /// SQL representation.
    #[error("value of type {0} cannot be lowered to a SQL parameter")]
    UnsupportedValue(&'static str),
}

// ============================================================================
// SECTION: Compilation
// ============================================================================

/// Lowers `query` to `(sql_text, params)`, resolving `BoundEquals`
/// predicates against `bound_values`.
///
/// # Errors
///
/// Returns [`SqlError`] on an invalid identifier, an unbound variable
/// reference, or a non-scalar value.
pub fn compile(query: &Query, bound_values: &BTreeMap<String, Value>) -> Result<(String, Vec<Value>), SqlError> {
    let mut params = Vec::new();
    let body = lower_query(query, bound_values, &mut params)?;
    Ok((format!("{body} ORDER BY id ASC COLLATE BINARY"), params))
}

/// Lowers a query to its core `SELECT ... [WHERE ...]` form, without the
/// trailing `ORDER BY`.
fn lower_query(query: &Query, bound_values: &BTreeMap<String, Value>, params: &mut Vec<Value>) -> Result<String, SqlError> {
    match query {
        Query::Select(select) => lower_select(select, bound_values, params),
        Query::Join(join) => {
            let left = lower_query(&join.left, bound_values, params)?;
            let right = lower_query(&join.right, bound_values, params)?;
            let on_sql = match &join.on {
                Some(predicate) => lower_predicate(predicate, bound_values, params)?,
                None => "1 = 1".to_string(),
            };
            Ok(format!("SELECT * FROM ({left}) INNER JOIN ({right}) ON {on_sql}"))
        }
    }
}

/// Lowers a `Select` to `SELECT projection FROM source [WHERE predicate]`.
fn lower_select(select: &Select, bound_values: &BTreeMap<String, Value>, params: &mut Vec<Value>) -> Result<String, SqlError> {
    validate_identifier(&select.from)?;

    let projection = if select.bindings.is_empty() {
        "*".to_string()
    } else {
        let mut parts = Vec::with_capacity(select.bindings.len());
        // `BTreeMap` iteration is already key-sorted, giving byte-stable
        // output without an extra sort pass.
        for (source_field, variable) in &select.bindings {
            validate_identifier(source_field)?;
            validate_identifier(variable)?;
            if source_field == variable {
                parts.push(source_field.clone());
            } else {
                parts.push(format!("{source_field} AS {variable}"));
            }
        }
        parts.join(", ")
    };

    let mut sql = format!("SELECT {projection} FROM {}", select.from);
    if let Some(filter) = &select.filter {
        let predicate_sql = lower_predicate(filter, bound_values, params)?;
        sql.push_str(" WHERE ");
        sql.push_str(&predicate_sql);
    }
    Ok(sql)
}

/// Lowers a `Predicate` to a SQL boolean expression, appending any literal
/// values to `params`.
fn lower_predicate(predicate: &Predicate, bound_values: &BTreeMap<String, Value>, params: &mut Vec<Value>) -> Result<String, SqlError> {
    match predicate {
        Predicate::Equals {
            field,
            literal,
        } => {
            validate_identifier(field)?;
            check_scalar(literal)?;
            params.push(literal.clone());
            Ok(format!("{field} = ?"))
        }
        Predicate::BoundEquals {
            field,
            bound_var,
        } => {
            validate_identifier(field)?;
            let value = bound_values
                .get(bound_var)
                .ok_or_else(|| SqlError::UnboundVariable(bound_var.clone()))?;
            check_scalar(value)?;
            params.push(value.clone());
            Ok(format!("{field} = ?"))
        }
        Predicate::And(items) => {
            if items.is_empty() {
                return Ok("1 = 1".to_string());
            }
            let mut clauses = Vec::with_capacity(items.len());
            for item in items {
                clauses.push(format!("({})", lower_predicate(item, bound_values, params)?));
            }
            Ok(clauses.join(" AND "))
        }
    }
}

/// Rejects `Array`/`Object` values, which have no SQL parameter form.
fn check_scalar(value: &Value) -> Result<(), SqlError> {
    match value {
        Value::Array(_) => Err(SqlError::UnsupportedValue("array")),
        Value::Object(_) => Err(SqlError::UnsupportedValue("object")),
        Value::Null | Value::String(_) | Value::Int(_) | Value::Bool(_) => Ok(()),
    }
}

/// Validates a table/column identifier against `[A-Za-z_][A-Za-z0-9_]*`.
fn validate_identifier(name: &str) -> Result<(), SqlError> {
    let mut chars = name.chars();
    let is_valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if is_valid {
        Ok(())
    } else {
        Err(SqlError::InvalidIdentifier(name.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Join;

    #[test]
    fn every_query_ends_with_order_by_and_no_literal_leaks() {
        let query = Query::Select(Select {
            from: "cart_items".to_string(),
            filter: Some(Predicate::Equals {
                field: "item_id".to_string(),
                literal: Value::String("';DROP TABLE inventory;--".to_string()),
            }),
            bindings: BTreeMap::from([("item_id".to_string(), "item_id".to_string())]),
        });
        let (sql, params) = compile(&query, &BTreeMap::new()).expect("compiles");
        assert!(sql.ends_with("ORDER BY id ASC COLLATE BINARY"));
        assert!(!sql.contains("DROP TABLE"));
        assert_eq!(params, vec![Value::String("';DROP TABLE inventory;--".to_string())]);
    }

    #[test]
    fn identifier_outside_allow_list_is_rejected() {
        let query = Query::Select(Select {
            from: "cart items".to_string(),
            filter: None,
            bindings: BTreeMap::new(),
        });
        let err = compile(&query, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, SqlError::InvalidIdentifier(_)));
    }

    #[test]
    fn empty_and_lowers_to_vacuous_truth() {
        let query = Query::Select(Select {
            from: "t".to_string(),
            filter: Some(Predicate::And(Vec::new())),
            bindings: BTreeMap::new(),
        });
        let (sql, _) = compile(&query, &BTreeMap::new()).expect("compiles");
        assert!(sql.contains("WHERE 1 = 1"));
    }

    #[test]
    fn join_with_no_predicate_lowers_to_on_one_equals_one() {
        let left = Query::Select(Select {
            from: "a".to_string(),
            filter: None,
            bindings: BTreeMap::new(),
        });
        let right = Query::Select(Select {
            from: "b".to_string(),
            filter: None,
            bindings: BTreeMap::new(),
        });
        let query = Query::Join(Join {
            left: Box::new(left),
            right: Box::new(right),
            on: None,
        });
        let (sql, _) = compile(&query, &BTreeMap::new()).expect("compiles");
        assert!(sql.contains("INNER JOIN"));
        assert!(sql.contains("ON 1 = 1"));
    }

    #[test]
    fn binding_with_same_source_and_var_has_no_alias() {
        let query = Query::Select(Select {
            from: "t".to_string(),
            filter: None,
            bindings: BTreeMap::from([("x".to_string(), "x".to_string())]),
        });
        let (sql, _) = compile(&query, &BTreeMap::new()).expect("compiles");
        assert!(sql.contains("SELECT x FROM t"));
        assert!(!sql.contains("AS"));
    }
}
