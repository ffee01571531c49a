// crates/nysm-ir/src/record.rs
// ============================================================================
// Module: Log Records
// Description: Invocation, Completion, SyncFiring, and ProvenanceEdge.
// Purpose: The append-only record types persisted by the event log.
// Dependencies: crate::{identifiers, value}, serde
// ============================================================================

//! ## Overview
//! These are the four record shapes the store (spec §4.F, §6) persists.
//! `Invocation` and `Completion` carry content-addressed `id`s computed by
//! `crate::identity`; `SyncFiring` and `ProvenanceEdge` carry store-internal
//! surrogate keys (spec §9's third Open Question) that must never be
//! exposed in replay output.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::ActionUri;
use crate::identifiers::BindingHash;
use crate::identifiers::CompletionId;
use crate::identifiers::EngineVersion;
use crate::identifiers::FlowToken;
use crate::identifiers::InvocationId;
use crate::identifiers::IrVersion;
use crate::identifiers::OutputCase;
use crate::identifiers::SpecHash;
use crate::identifiers::SyncRuleId;
use crate::value::Value;

// ============================================================================
// SECTION: Security Context
// ============================================================================

/// Tenant/user/permission context carried on a record for audit purposes.
/// Deliberately excluded from every identity preimage (spec §4.B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SecurityContext {
    /// Tenant identifier, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    /// Acting user identifier, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Permissions held by the acting principal.
    #[serde(default)]
    pub permissions: Vec<String>,
}

// ============================================================================
// SECTION: Invocation
// ============================================================================

/// A persisted invocation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Content-addressed invocation identifier.
    pub id: InvocationId,
    /// Flow token threading this invocation to its causally related family.
    pub flow_token: FlowToken,
    /// Action URI being invoked.
    pub action_uri: ActionUri,
    /// Invocation arguments. Must be an `Object` value.
    pub args: Value,
    /// Logical clock value assigned when this invocation was popped.
    pub seq: i64,
    /// Audit-only authorization context.
    pub security_context: SecurityContext,
    /// Hash of the concept spec set this invocation was compiled against.
    pub spec_hash: SpecHash,
    /// Engine version that produced this record.
    pub engine_version: EngineVersion,
    /// Canonical IR version this record was encoded under.
    pub ir_version: IrVersion,
}

// ============================================================================
// SECTION: Completion
// ============================================================================

/// A persisted completion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Content-addressed completion identifier.
    pub id: CompletionId,
    /// Invocation this completion resolves.
    pub invocation_id: InvocationId,
    /// Output case the handler completed with.
    pub output_case: OutputCase,
    /// Completion result. Must be an `Object` value.
    pub result: Value,
    /// Logical clock value assigned when this completion was written.
    pub seq: i64,
    /// Audit-only authorization context.
    pub security_context: SecurityContext,
}

// ============================================================================
// SECTION: Sync Firing
// ============================================================================

/// A recorded (completion, rule, binding) firing. `id` is a store-internal
/// surrogate key, not a content-addressed identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFiring {
    /// Store-internal surrogate key.
    pub id: i64,
    /// Completion that triggered this firing.
    pub completion_id: CompletionId,
    /// Sync rule that fired.
    pub sync_id: SyncRuleId,
    /// Content-addressed hash of the binding row that fired.
    pub binding_hash: BindingHash,
    /// Logical clock value assigned when this firing was recorded.
    pub seq: i64,
}

// ============================================================================
// SECTION: Provenance Edge
// ============================================================================

/// A directed edge from a firing to the derived invocation it produced.
/// `id` is a store-internal surrogate key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEdge {
    /// Store-internal surrogate key.
    pub id: i64,
    /// Firing that produced the derived invocation.
    pub sync_firing_id: i64,
    /// Derived invocation identifier.
    pub invocation_id: InvocationId,
}
