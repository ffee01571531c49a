// crates/nysm-ir/src/spec.rs
// ============================================================================
// Module: Concept Specification Model
// Description: ConceptSpec, ActionSig, and the allow-listed type system used
//              to describe concept state and action shapes.
// Purpose: Give the engine a typed, serializable description of what a
//          concept's actions accept and return.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A `ConceptSpec` is a small state machine description: a purpose
//! statement, a state schema, a set of typed actions, and a list of
//! operational principles (narrative text, not executable). `validate`
//! (see `crate::validate`) checks the invariants listed in spec §3/§4.C.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Type Names
// ============================================================================

/// The allow-listed primitive type names a concept's fields may declare.
/// There is no `float` variant: the value algebra has no representation for
/// floating-point numbers (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeName {
    /// A UTF-8 string.
    String,
    /// A 64-bit signed integer.
    Int,
    /// A boolean.
    Bool,
    /// An array of values.
    Array,
    /// An object of values.
    Object,
}

impl TypeName {
    /// Parses a type name from its wire string, rejecting anything outside
    /// the allow-list (in particular `float`).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "int" => Some(Self::Int),
            "bool" => Some(Self::Bool),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Action Signatures
// ============================================================================

/// A named, typed argument or field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedArg {
    /// Field or argument name.
    pub name: String,
    /// Declared type name.
    #[serde(rename = "type")]
    pub type_name: String,
}

/// One output case an action may complete with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCaseSpec {
    /// Output case name, e.g. `"Success"` or `"CheckoutFailed"`.
    pub case: String,
    /// Named, typed result fields for this case.
    pub fields: Vec<NamedArg>,
}

/// A concept action's full signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSig {
    /// Action name, unique within its concept.
    pub name: String,
    /// Declared input arguments.
    pub args: Vec<NamedArg>,
    /// Declared output cases. Must be non-empty with unique `case` names
    /// (spec §3).
    pub outputs: Vec<OutputCaseSpec>,
    /// Permissions required to invoke this action.
    #[serde(default)]
    pub requires: Vec<String>,
}

// ============================================================================
// SECTION: Concept Specification
// ============================================================================

/// A concept: a small state machine with typed actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptSpec {
    /// Concept name.
    pub name: String,
    /// Human-readable statement of the concept's purpose. Must be
    /// non-empty (spec §4.C).
    pub purpose: String,
    /// State schema fields.
    pub state_schema: Vec<NamedArg>,
    /// Declared actions. Must be non-empty (spec §4.C).
    pub actions: Vec<ActionSig>,
    /// Narrative operational principles; not executable.
    #[serde(default)]
    pub operational_principles: Vec<String>,
}
