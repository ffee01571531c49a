// crates/nysm-ir/src/validate.rs
// ============================================================================
// Module: Spec & Rule Validation
// Description: Full-coverage validators for ConceptSpec and SyncRule.
// Purpose: Surface every violation in one pass rather than failing fast.
// Dependencies: crate::{rule, spec}, std::collections
// ============================================================================

//! ## Overview
//! `validate_concept_spec` and `validate_sync_rule` never stop at the first
//! problem: every violation the input contains is collected and returned
//! together, each tagged with a stable [`ViolationCode`] and a
//! `field_path` pointing at the offending value (spec §4.C).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::rule::ArgExpr;
use crate::rule::FilterSpec;
use crate::rule::ScopeMode;
use crate::rule::SyncRule;
use crate::spec::ActionSig;
use crate::spec::ConceptSpec;
use crate::spec::TypeName;

// ============================================================================
// SECTION: Violation
// ============================================================================

/// Stable violation codes, one per rule enforced by this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationCode {
    /// `purpose` is empty or missing meaningful content.
    EmptyPurpose,
    /// A concept declares zero actions.
    NoActions,
    /// An action declares zero output cases.
    NoOutputCases,
    /// An action declares two output cases with the same name.
    DuplicateOutputCase,
    /// A declared type name is outside `{string,int,bool,array,object}`.
    UnknownType,
    /// A sync rule's `when.action_ref` does not resolve to a known action.
    UnresolvedActionRef,
    /// A sync rule's `when.output_case` is not declared on the action.
    UnknownOutputCase,
    /// `scope.mode == keyed` but no `scope.key` was given.
    MissingScopeKey,
    /// A then-clause argument references a variable no when/where clause
    /// binds.
    UnboundVariable,
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path to the offending field.
    pub field_path: String,
    /// Stable violation code.
    pub code: ViolationCode,
    /// Human-readable explanation.
    pub message: String,
}

impl Violation {
    fn new(field_path: impl Into<String>, code: ViolationCode, message: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            code,
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Concept Spec Validation
// ============================================================================

/// Validates a [`ConceptSpec`], collecting every violation found.
#[must_use]
pub fn validate_concept_spec(spec: &ConceptSpec) -> Vec<Violation> {
    let mut violations = Vec::new();

    if spec.purpose.trim().is_empty() {
        violations.push(Violation::new(
            "purpose",
            ViolationCode::EmptyPurpose,
            "purpose must be a non-empty string",
        ));
    }

    if spec.actions.is_empty() {
        violations.push(Violation::new(
            "actions",
            ViolationCode::NoActions,
            "a concept must declare at least one action",
        ));
    }

    for field in &spec.state_schema {
        check_type_name(&format!("state_schema[{}].type", field.name), &field.type_name, &mut violations);
    }

    for (action_index, action) in spec.actions.iter().enumerate() {
        validate_action(action_index, action, &mut violations);
    }

    violations
}

/// Validates a single action signature, appending violations to `out`.
fn validate_action(index: usize, action: &ActionSig, out: &mut Vec<Violation>) {
    let base = format!("actions[{index}]");

    for arg in &action.args {
        check_type_name(&format!("{base}.args[{}].type", arg.name), &arg.type_name, out);
    }

    if action.outputs.is_empty() {
        out.push(Violation::new(
            format!("{base}.outputs"),
            ViolationCode::NoOutputCases,
            format!("action '{}' must declare at least one output case", action.name),
        ));
    }

    let mut seen_cases = BTreeSet::new();
    for output in &action.outputs {
        if !seen_cases.insert(output.case.clone()) {
            out.push(Violation::new(
                format!("{base}.outputs[{}]", output.case),
                ViolationCode::DuplicateOutputCase,
                format!("duplicate output case name '{}' on action '{}'", output.case, action.name),
            ));
        }
        for field in &output.fields {
            check_type_name(
                &format!("{base}.outputs[{}].fields[{}].type", output.case, field.name),
                &field.type_name,
                out,
            );
        }
    }
}

/// Checks that `type_name` is in the allow-list, recording a violation if
/// not.
fn check_type_name(field_path: &str, type_name: &str, out: &mut Vec<Violation>) {
    if TypeName::parse(type_name).is_none() {
        out.push(Violation::new(
            field_path.to_string(),
            ViolationCode::UnknownType,
            format!("type '{type_name}' is not in {{string,int,bool,array,object}}"),
        ));
    }
}

// ============================================================================
// SECTION: Sync Rule Validation
// ============================================================================

/// A lookup of declared actions by `action_uri`, used to resolve
/// `when.action_ref` during sync-rule validation.
pub struct ActionCatalog<'a> {
    actions: BTreeMap<String, &'a ActionSig>,
}

impl<'a> ActionCatalog<'a> {
    /// Builds a catalog from a set of concept specs, keying actions as
    /// `"<ConceptName>.<ActionName>"`.
    #[must_use]
    pub fn from_specs(specs: &'a [ConceptSpec]) -> Self {
        let mut actions = BTreeMap::new();
        for spec in specs {
            for action in &spec.actions {
                actions.insert(format!("{}.{}", spec.name, action.name), action);
            }
        }
        Self {
            actions,
        }
    }

    /// Looks up an action by its fully qualified URI.
    #[must_use]
    pub fn get(&self, action_uri: &str) -> Option<&'a ActionSig> {
        self.actions.get(action_uri).copied()
    }
}

/// Validates a [`SyncRule`] against a catalog of known actions, collecting
/// every violation found.
#[must_use]
pub fn validate_sync_rule(rule: &SyncRule, catalog: &ActionCatalog<'_>) -> Vec<Violation> {
    let mut violations = Vec::new();

    if rule.scope.mode == ScopeMode::Keyed && rule.scope.key.is_none() {
        violations.push(Violation::new(
            "scope.key",
            ViolationCode::MissingScopeKey,
            "scope.mode == keyed requires scope.key",
        ));
    }

    let action = catalog.get(rule.when.action_ref.as_str());
    match action {
        None => violations.push(Violation::new(
            "when.action_ref",
            ViolationCode::UnresolvedActionRef,
            format!("action '{}' is not declared by any concept", rule.when.action_ref),
        )),
        Some(action) => {
            if let Some(case) = &rule.when.output_case
                && !action.outputs.iter().any(|o| o.case == case.as_str())
            {
                violations.push(Violation::new(
                    "when.output_case",
                    ViolationCode::UnknownOutputCase,
                    format!("action '{}' has no output case '{case}'", rule.when.action_ref),
                ));
            }
        }
    }

    let mut bound: BTreeSet<&str> = rule.when.bindings.keys().map(String::as_str).collect();
    if let Some(where_clause) = &rule.where_clause {
        bound.extend(where_clause.bindings.values().map(String::as_str));
        check_filter_vars(&where_clause.filter, &bound, &mut violations);
    }

    for (arg_name, expr) in &rule.then.args {
        if let ArgExpr::Var {
            name,
        } = expr
            && !bound.contains(name.as_str())
        {
            violations.push(Violation::new(
                format!("then.args[{arg_name}]"),
                ViolationCode::UnboundVariable,
                format!("then.args['{arg_name}'] references unbound variable '{name}'"),
            ));
        }
    }

    violations
}

/// Recursively checks a `FilterSpec`'s `BoundEquals` references against the
/// currently bound variable set.
fn check_filter_vars(filter: &FilterSpec, bound: &BTreeSet<&str>, out: &mut Vec<Violation>) {
    match filter {
        FilterSpec::Equals {
            ..
        } => {}
        FilterSpec::BoundEquals {
            bound_var, ..
        } => {
            if !bound.contains(bound_var.as_str()) {
                out.push(Violation::new(
                    "where.filter",
                    ViolationCode::UnboundVariable,
                    format!("where-clause filter references unbound variable '{bound_var}'"),
                ));
            }
        }
        FilterSpec::And(items) => {
            for item in items {
                check_filter_vars(item, bound, out);
            }
        }
    }
}
