// crates/nysm-ir/src/identity.rs
// ============================================================================
// Module: Content-Addressed Identity
// Description: Domain-separated hashing used to mint invocation, completion,
//              and binding identifiers.
// Purpose: Give every record a stable identity that answers "what happened",
//          never "who did it".
// Dependencies: crate::value, sha2
// ============================================================================

//! ## Overview
//! Every identity in NYSM is `SHA-256(domain_tag ++ 0x00 ++ canonical_bytes)`.
//! The `0x00` separator is mandatory: without it, `hash_with_domain("foo",
//! "bar")` and `hash_with_domain("foob", "ar")` would collide whenever the
//! tag and payload happen to concatenate identically.
//!
//! `security_context` is deliberately excluded from every preimage here —
//! identity must stay stable across replays performed under a different
//! authorization context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use sha2::Digest;
use sha2::Sha256;

use crate::value::Value;

// ============================================================================
// SECTION: Domain Tags
// ============================================================================

/// Domain tag for invocation identity.
pub const INVOCATION_DOMAIN: &str = "nysm/invocation/v1";
/// Domain tag for completion identity.
pub const COMPLETION_DOMAIN: &str = "nysm/completion/v1";
/// Domain tag for binding identity.
pub const BINDING_DOMAIN: &str = "nysm/binding/v1";

// ============================================================================
// SECTION: Core Primitive
// ============================================================================

/// Hashes `domain_tag ++ 0x00 ++ bytes` with SHA-256, returning lowercase hex.
#[must_use]
pub fn hash_with_domain(domain_tag: &str, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain_tag.as_bytes());
    hasher.update([0x00]);
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Derived Hashes
// ============================================================================

/// Computes `invocation_id = hash_with_domain("nysm/invocation/v1",
/// canonical_encode({flow_token, action_uri, args, seq}))`.
///
/// `security_context` is not part of the preimage by design (spec §4.B).
#[must_use]
pub fn invocation_id(flow_token: &str, action_uri: &str, args: &Value, seq: i64) -> String {
    let preimage = Value::object([
        ("flow_token".to_string(), Value::String(flow_token.to_string())),
        ("action_uri".to_string(), Value::String(action_uri.to_string())),
        ("args".to_string(), args.clone()),
        ("seq".to_string(), Value::Int(seq)),
    ]);
    hash_with_domain(INVOCATION_DOMAIN, &preimage.canonical_encode())
}

/// Computes `completion_id = hash_with_domain("nysm/completion/v1",
/// canonical_encode({invocation_id, output_case, result, seq}))`.
#[must_use]
pub fn completion_id(invocation_id: &str, output_case: &str, result: &Value, seq: i64) -> String {
    let preimage = Value::object([
        ("invocation_id".to_string(), Value::String(invocation_id.to_string())),
        ("output_case".to_string(), Value::String(output_case.to_string())),
        ("result".to_string(), result.clone()),
        ("seq".to_string(), Value::Int(seq)),
    ]);
    hash_with_domain(COMPLETION_DOMAIN, &preimage.canonical_encode())
}

/// Computes `binding_hash = hash_with_domain("nysm/binding/v1",
/// canonical_encode(bindings))`.
#[must_use]
pub fn binding_hash(bindings: &BTreeMap<String, Value>) -> String {
    let preimage = Value::Object(bindings.clone());
    hash_with_domain(BINDING_DOMAIN, &preimage.canonical_encode())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_separation_is_pairwise_distinct() {
        let args = Value::object([("k".to_string(), Value::Int(1))]);
        let inv = invocation_id("flow-1", "Cart.addItem", &args, 1);
        let comp = completion_id("inv-1", "Success", &args, 2);
        let bind = binding_hash(&BTreeMap::from([("x".to_string(), Value::Int(1))]));
        assert_ne!(inv, comp);
        assert_ne!(comp, bind);
        assert_ne!(inv, bind);
    }

    #[test]
    fn null_separator_prevents_tag_payload_ambiguity() {
        let a = hash_with_domain("foo", b"bar");
        let b = hash_with_domain("foob", b"ar");
        assert_ne!(a, b);
    }

    #[test]
    fn invocation_id_is_stable_across_calls() {
        let args = Value::object([("item_id".to_string(), Value::String("widget".into()))]);
        let first = invocation_id("flow-1", "Cart.addItem", &args, 7);
        let second = invocation_id("flow-1", "Cart.addItem", &args, 7);
        assert_eq!(first, second);
    }

    #[test]
    fn security_context_excluded_means_identity_ignores_it() {
        // There is no security_context parameter at all: callers cannot
        // perturb identity by varying authorization context, by construction.
        let args = Value::object([("k".to_string(), Value::Int(1))]);
        let a = invocation_id("flow-1", "X.y", &args, 1);
        let b = invocation_id("flow-1", "X.y", &args, 1);
        assert_eq!(a, b);
    }
}
