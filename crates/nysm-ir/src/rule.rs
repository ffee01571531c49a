// crates/nysm-ir/src/rule.rs
// ============================================================================
// Module: Sync Rule Model
// Description: SyncRule and its when/where/then clauses.
// Purpose: Describe "on completion X, optionally query state, then enqueue
//          action Y" reactions declaratively.
// Dependencies: crate::{identifiers, value}, serde
// ============================================================================

//! ## Overview
//! A [`SyncRule`] is data, not code: the engine (`nysm-engine`) interprets
//! it against completions and store state. `FilterSpec` is a rule-authoring
//! level predicate description; the engine lowers it into a
//! `nysm_query::Predicate` rather than this crate depending on `nysm-query`
//! directly, which would create a cycle (`nysm-query` already depends on
//! `nysm-ir` for [`crate::value::Value`]).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::ActionUri;
use crate::identifiers::OutputCase;
use crate::identifiers::SyncRuleId;
use crate::value::Value;

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Scope mode controlling how a sync firing is deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    /// Firings are uniquely keyed within the originating flow token.
    Flow,
    /// Firings are uniquely keyed across all flows.
    Global,
    /// Firings are uniquely keyed by a named field from the binding row.
    Keyed,
}

/// A sync rule's scope declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    /// Scope mode.
    pub mode: ScopeMode,
    /// Binding variable naming the dedup key, required when `mode` is
    /// [`ScopeMode::Keyed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

// ============================================================================
// SECTION: When Clause
// ============================================================================

/// The completion event kind a when-clause matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Matches when an invocation is written.
    Invoked,
    /// Matches when a completion is written.
    Completed,
}

/// The when-clause of a sync rule: which completion triggers it and how to
/// derive an initial binding map from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhenClause {
    /// Action URI this rule reacts to.
    pub action_ref: ActionUri,
    /// Event type the rule reacts to.
    pub event_type: EventType,
    /// Output case to match; an absent value matches any case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_case: Option<OutputCase>,
    /// Variable name to JSON-pointer-like path, evaluated against the
    /// completion to produce the when-binding map.
    pub bindings: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: Where Clause
// ============================================================================

/// A rule-authoring-level filter expression. The engine lowers this into a
/// `nysm_query::Predicate` when evaluating a where-clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterSpec {
    /// Field equals a literal value.
    Equals {
        /// Source field name.
        field: String,
        /// Literal value to compare against.
        literal: Value,
    },
    /// Field equals the value of an already-bound variable.
    BoundEquals {
        /// Source field name.
        field: String,
        /// Name of the bound variable supplying the comparison value.
        bound_var: String,
    },
    /// Conjunction of filters. An empty list is vacuously true.
    And(Vec<FilterSpec>),
}

/// The optional where-clause of a sync rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    /// Logical source (table/stream) name to query.
    pub source: String,
    /// Filter applied to rows from `source`.
    pub filter: FilterSpec,
    /// Source-field to variable bindings projected from matching rows.
    pub bindings: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: Then Clause
// ============================================================================

/// An argument expression in a then-clause: either a bound variable
/// reference or a literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArgExpr {
    /// Substitutes the value of a bound variable.
    Var {
        /// Variable name.
        name: String,
    },
    /// A literal value.
    Literal {
        /// Literal value.
        value: Value,
    },
}

/// The then-clause of a sync rule: the derived invocation to enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThenClause {
    /// Action URI to invoke.
    pub action_ref: ActionUri,
    /// Argument expressions evaluated under the rule's binding row.
    pub args: BTreeMap<String, ArgExpr>,
}

// ============================================================================
// SECTION: Sync Rule
// ============================================================================

/// A complete sync rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRule {
    /// Stable rule identifier.
    pub id: SyncRuleId,
    /// Firing deduplication scope.
    pub scope: Scope,
    /// When-clause matching completions.
    pub when: WhenClause,
    /// Optional where-clause extending the binding set via a query.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,
    /// Then-clause describing the derived invocation.
    pub then: ThenClause,
}
