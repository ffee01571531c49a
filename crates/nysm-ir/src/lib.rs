// crates/nysm-ir/src/lib.rs
// ============================================================================
// Module: NYSM Canonical IR
// Description: Public API surface for the canonical value algebra, identity,
//              and spec/rule model.
// Purpose: Expose the value domain every other NYSM crate builds on.
// Dependencies: crate::{identifiers, identity, record, rule, spec, validate,
//              value}
// ============================================================================

//! ## Overview
//! `nysm-ir` provides the value algebra and its RFC 8785 canonical
//! serialization, content-addressed identity hashing, and the typed
//! ConceptSpec/SyncRule data model plus its validators. It has no
//! dependency on storage, querying, or the sync engine: those build on top
//! of this crate, not the other way around.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod identifiers;
pub mod identity;
pub mod record;
pub mod rule;
pub mod spec;
pub mod validate;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::ActionUri;
pub use identifiers::BindingHash;
pub use identifiers::CompletionId;
pub use identifiers::EngineVersion;
pub use identifiers::FlowToken;
pub use identifiers::InvocationId;
pub use identifiers::IrVersion;
pub use identifiers::KeyedScopeKey;
pub use identifiers::OutputCase;
pub use identifiers::SpecHash;
pub use identifiers::SyncRuleId;
pub use identity::BINDING_DOMAIN;
pub use identity::COMPLETION_DOMAIN;
pub use identity::INVOCATION_DOMAIN;
pub use identity::binding_hash;
pub use identity::completion_id;
pub use identity::hash_with_domain;
pub use identity::invocation_id;
pub use record::Completion;
pub use record::Invocation;
pub use record::ProvenanceEdge;
pub use record::SecurityContext;
pub use record::SyncFiring;
pub use rule::ArgExpr;
pub use rule::EventType;
pub use rule::FilterSpec;
pub use rule::Scope;
pub use rule::ScopeMode;
pub use rule::SyncRule;
pub use rule::ThenClause;
pub use rule::WhenClause;
pub use rule::WhereClause;
pub use spec::ActionSig;
pub use spec::ConceptSpec;
pub use spec::NamedArg;
pub use spec::OutputCaseSpec;
pub use spec::TypeName;
pub use validate::ActionCatalog;
pub use validate::Violation;
pub use validate::ViolationCode;
pub use validate::validate_concept_spec;
pub use validate::validate_sync_rule;
pub use value::DecodeError;
pub use value::Value;
