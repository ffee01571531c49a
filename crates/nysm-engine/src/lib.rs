// crates/nysm-engine/src/lib.rs
// ============================================================================
// Module: NYSM Sync Engine
// Description: Public API surface for the single-writer event loop.
// Purpose: Give the conformance harness and the CLI a way to drive a flow
//          from registered action handlers and a declared set of sync rules.
// Dependencies: crate::{bindings, clock, engine, error, handler, mailbox}
// ============================================================================

//! ## Overview
//! `nysm-engine` implements spec §4.G and §5: a cooperative, single-writer
//! event loop reading from a thread-safe mailbox, invoking registered action
//! handlers, and firing sync rules against the completions those handlers
//! produce.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bindings;
pub mod clock;
pub mod engine;
pub mod error;
pub mod handler;
pub mod mailbox;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use clock::LogicalClock;
pub use engine::CancellationToken;
pub use engine::FlowTokenGenerator;
pub use engine::GLOBAL_SCOPE_TOKEN;
pub use engine::SequentialFlowTokenGenerator;
pub use engine::SyncEngine;
pub use error::EngineError;
pub use handler::ActionHandler;
pub use handler::HandlerRegistry;
pub use mailbox::InvocationSpec;
pub use mailbox::MailboxEvent;
pub use mailbox::MailboxReceiver;
pub use mailbox::MailboxSender;
pub use mailbox::channel;
