// crates/nysm-query/src/portability.rs
// ============================================================================
// Module: Portability Validator
// Description: Flags query shapes that would not survive a migration to a
//              non-relational backend, without rejecting them.
// Purpose: Guide future backend migration; never blocks execution.
// Dependencies: crate::ir
// ============================================================================

//! ## Overview
//! `validate_portable` walks a [`Query`] tree and collects warnings for
//! implicit "select all" bindings and `Equals` comparisons against `Null`.
//! Non-portable queries still execute on the relational backend (spec
//! §4.D) — this is advisory, not enforcement.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nysm_ir::Value;

use crate::ir::Predicate;
use crate::ir::Query;

// ============================================================================
// SECTION: Report
// ============================================================================

/// Result of a portability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortabilityReport {
    /// Whether the query avoided every flagged shape.
    pub is_portable: bool,
    /// Human-readable warnings, one per flagged shape.
    pub warnings: Vec<String>,
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates `query` for portability to a non-relational backend.
#[must_use]
pub fn validate_portable(query: &Query) -> PortabilityReport {
    let mut warnings = Vec::new();
    walk_query(query, &mut warnings);
    PortabilityReport {
        is_portable: warnings.is_empty(),
        warnings,
    }
}

/// Recursively walks a query, appending warnings.
fn walk_query(query: &Query, warnings: &mut Vec<String>) {
    match query {
        Query::Select(select) => {
            if select.bindings.is_empty() {
                warnings.push(format!(
                    "select over '{}' has empty bindings (implicit select-all)",
                    select.from
                ));
            }
            if let Some(filter) = &select.filter {
                walk_predicate(filter, warnings);
            }
        }
        Query::Join(join) => {
            walk_query(&join.left, warnings);
            walk_query(&join.right, warnings);
            if let Some(on) = &join.on {
                walk_predicate(on, warnings);
            }
        }
    }
}

/// Recursively walks a predicate, appending warnings.
fn walk_predicate(predicate: &Predicate, warnings: &mut Vec<String>) {
    match predicate {
        Predicate::Equals {
            field,
            literal,
        } => {
            if matches!(literal, Value::Null) {
                warnings.push(format!("equals predicate on '{field}' compares against null"));
            }
        }
        Predicate::BoundEquals {
            ..
        } => {}
        Predicate::And(items) => {
            for item in items {
                walk_predicate(item, warnings);
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::ir::Select;

    #[test]
    fn empty_bindings_warns() {
        let query = Query::Select(Select {
            from: "t".to_string(),
            filter: None,
            bindings: BTreeMap::new(),
        });
        let report = validate_portable(&query);
        assert!(!report.is_portable);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn null_equals_warns() {
        let query = Query::Select(Select {
            from: "t".to_string(),
            filter: Some(Predicate::Equals {
                field: "x".to_string(),
                literal: Value::Null,
            }),
            bindings: BTreeMap::from([("x".to_string(), "x".to_string())]),
        });
        let report = validate_portable(&query);
        assert!(!report.is_portable);
    }

    #[test]
    fn explicit_bindings_and_non_null_equality_is_portable() {
        let query = Query::Select(Select {
            from: "t".to_string(),
            filter: Some(Predicate::Equals {
                field: "x".to_string(),
                literal: Value::Int(1),
            }),
            bindings: BTreeMap::from([("x".to_string(), "x".to_string())]),
        });
        let report = validate_portable(&query);
        assert!(report.is_portable);
        assert!(report.warnings.is_empty());
    }
}
