// crates/nysm-store/src/event.rs
// ============================================================================
// Module: Flow Events
// Description: The replay-facing projection of invocation/completion records.
// Purpose: Give `replay_flow` and the golden-snapshot harness a single event
//          shape instead of leaking the four underlying tables.
// Dependencies: nysm-ir
// ============================================================================

//! ## Overview
//! A [`FlowEvent`] never carries a store-internal surrogate key (spec §9's
//! third Open Question): sync firings and provenance edges are folded into
//! the invocation/completion events they produced rather than replayed as
//! events of their own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nysm_ir::ActionUri;
use nysm_ir::CompletionId;
use nysm_ir::InvocationId;
use nysm_ir::OutputCase;
use nysm_ir::SecurityContext;
use nysm_ir::Value;

// ============================================================================
// SECTION: FlowEvent
// ============================================================================

/// One replayable event in a flow's history.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    /// An invocation was written.
    Invocation {
        /// Logical clock value.
        seq: i64,
        /// Content-addressed invocation identifier.
        id: InvocationId,
        /// Action invoked.
        action_uri: ActionUri,
        /// Invocation arguments.
        args: Value,
        /// Audit-only context, carried for completeness.
        security_context: SecurityContext,
    },
    /// A completion was written.
    Completion {
        /// Logical clock value.
        seq: i64,
        /// Content-addressed completion identifier.
        id: CompletionId,
        /// Invocation this completion resolves.
        invocation_id: InvocationId,
        /// Output case the handler completed with.
        output_case: OutputCase,
        /// Completion result.
        result: Value,
        /// Audit-only context, carried for completeness.
        security_context: SecurityContext,
    },
}

impl FlowEvent {
    /// Returns this event's logical clock value.
    #[must_use]
    pub const fn seq(&self) -> i64 {
        match self {
            Self::Invocation {
                seq,
                ..
            }
            | Self::Completion {
                seq,
                ..
            } => *seq,
        }
    }

    /// Returns a `(type_rank, id)` key used to tiebreak events sharing a
    /// `seq` (spec §4.F: "not permitted but defensively handled").
    fn tiebreak_key(&self) -> (u8, &str) {
        match self {
            Self::Invocation {
                id,
                ..
            } => (0, id.as_str()),
            Self::Completion {
                id,
                ..
            } => (1, id.as_str()),
        }
    }
}

/// Orders events by `seq`, then by the `(type, id)` tiebreak.
#[must_use]
pub fn order_key(event: &FlowEvent) -> (i64, u8, String) {
    let (type_rank, id) = event.tiebreak_key();
    (event.seq(), type_rank, id.to_string())
}
