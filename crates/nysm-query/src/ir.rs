// crates/nysm-query/src/ir.rs
// ============================================================================
// Module: Query IR
// Description: The sealed Select/Join/Predicate algebra.
// Purpose: Give the sync engine an abstract relational fragment it can
//          evaluate against either a SQL backend or, in the future, a
//          different backend entirely.
// Dependencies: nysm-ir
// ============================================================================

//! ## Overview
//! `Query` and `Predicate` are closed sums: `Select`/`Join` and
//! `Equals`/`BoundEquals`/`And` are the only variants, matching spec §4.D.
//! No outer joins, aggregations, or subqueries are representable — that is
//! by construction, not by convention.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use nysm_ir::Value;

// ============================================================================
// SECTION: Predicate
// ============================================================================

/// A predicate over a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field == literal`.
    Equals {
        /// Field name.
        field: String,
        /// Literal value.
        literal: Value,
    },
    /// `field == bindings[bound_var]`.
    BoundEquals {
        /// Field name.
        field: String,
        /// Name of the bound variable supplying the comparison value.
        bound_var: String,
    },
    /// Conjunction. An empty vector is vacuously true.
    And(Vec<Predicate>),
}

// ============================================================================
// SECTION: Query
// ============================================================================

/// A select over a single source.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Source (table) name.
    pub from: String,
    /// Optional row filter.
    pub filter: Option<Predicate>,
    /// Projection: `source_field -> variable`. An empty map means "select
    /// all" (implicit, flagged by the portability validator).
    pub bindings: BTreeMap<String, String>,
}

/// An inner join between two queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Left-hand query.
    pub left: Box<Query>,
    /// Right-hand query.
    pub right: Box<Query>,
    /// Join predicate. `None` lowers to `ON 1 = 1`.
    pub on: Option<Predicate>,
}

/// The query IR's top-level sum: a `Select` or a `Join` of two queries.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// A select over a single source.
    Select(Select),
    /// An inner join of two queries.
    Join(Join),
}
