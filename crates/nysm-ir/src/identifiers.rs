// crates/nysm-ir/src/identifiers.rs
// ============================================================================
// Module: NYSM Identifiers
// Description: Opaque, strongly typed identifiers used throughout NYSM.
// Purpose: Prevent accidental mixing of string-shaped ids (flow tokens,
//          action uris, hashes) that have different semantics.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! These newtypes carry no validation of their own; they exist to keep
//! `flow_token`, `action_uri`, `sync_id`, and the various content-addressed
//! hash strings from being interchanged by accident at call sites.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Declares an opaque, string-backed identifier newtype with the standard
/// constructor/accessor/Display/From surface used across this crate.
macro_rules! string_identifier {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_identifier!(FlowToken, "Tags a causally related family of invocations.");
string_identifier!(ActionUri, "Names an action on a concept, e.g. `Cart.checkout`.");
string_identifier!(OutputCase, "Names one output case of an action's completion.");
string_identifier!(InvocationId, "Content-addressed identifier for an invocation.");
string_identifier!(CompletionId, "Content-addressed identifier for a completion.");
string_identifier!(SyncRuleId, "Identifier of a declared sync rule.");
string_identifier!(BindingHash, "Content-addressed identifier for a binding map.");
string_identifier!(SpecHash, "Canonical hash of the concept spec set a run was compiled against.");
string_identifier!(EngineVersion, "Version string of the engine that produced a record.");
string_identifier!(IrVersion, "Version string of the canonical IR a record was encoded under.");
string_identifier!(KeyedScopeKey, "Key value used to scope a `keyed` sync rule firing.");
