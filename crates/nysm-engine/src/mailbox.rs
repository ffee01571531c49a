// crates/nysm-engine/src/mailbox.rs
// ============================================================================
// Module: Invocation Mailbox
// Description: The thread-safe FIFO feeding the single-writer event loop.
// Purpose: Let external producers (CLI, harness) enqueue invocations from
//          any thread while the loop remains the sole consumer.
// Dependencies: nysm-ir, std::sync::mpsc
// ============================================================================

//! ## Overview
//! `std::sync::mpsc` gives FIFO ordering and wake-on-enqueue for free,
//! matching spec §5's mailbox contract without pulling in an async
//! runtime (the reference project's core crates are synchronous
//! throughout).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::mpsc;
use std::time::Duration;

use nysm_ir::ActionUri;
use nysm_ir::FlowToken;
use nysm_ir::SecurityContext;
use nysm_ir::Value;

// ============================================================================
// SECTION: Invocation Spec
// ============================================================================

/// A request to invoke an action, submitted by a caller or derived by a
/// firing sync rule.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationSpec {
    /// Action to invoke.
    pub action_uri: ActionUri,
    /// Invocation arguments. Must be an `Object` value.
    pub args: Value,
    /// Flow token to inherit. `None` mints a fresh root flow token.
    pub flow_token: Option<FlowToken>,
    /// Audit-only authorization context.
    pub security_context: SecurityContext,
    /// A `seq` reserved ahead of this invocation's own tick. Sync-rule
    /// firings set this when they mint the derived invocation's id eagerly
    /// to write its provenance edge in the same step (spec §4.G step (c));
    /// root invocations leave it `None` and receive a `seq` at tick time.
    pub(crate) seq: Option<i64>,
}

impl InvocationSpec {
    /// Builds a root invocation spec with no flow token and an empty
    /// security context.
    #[must_use]
    pub fn root(action_uri: ActionUri, args: Value) -> Self {
        Self {
            action_uri,
            args,
            flow_token: None,
            security_context: SecurityContext::default(),
            seq: None,
        }
    }
}

// ============================================================================
// SECTION: Mailbox
// ============================================================================

/// The sending half of the invocation mailbox. Cloneable: many producers
/// may hold one.
#[derive(Debug, Clone)]
pub struct MailboxSender {
    sender: mpsc::Sender<InvocationSpec>,
}

impl MailboxSender {
    /// Enqueues an invocation spec. Fails only if the loop's receiver has
    /// been dropped.
    ///
    /// # Errors
    ///
    /// Returns the spec back if the receiving end has disconnected.
    pub fn send(&self, spec: InvocationSpec) -> Result<(), InvocationSpec> {
        self.sender.send(spec).map_err(|err| err.0)
    }
}

/// The receiving half of the invocation mailbox, owned by the event loop.
#[derive(Debug)]
pub struct MailboxReceiver {
    receiver: mpsc::Receiver<InvocationSpec>,
}

impl MailboxReceiver {
    /// Blocks until an invocation spec is available or every sender has
    /// disconnected.
    #[must_use]
    pub fn recv(&self) -> Option<InvocationSpec> {
        self.receiver.recv().ok()
    }

    /// Returns an already-enqueued spec without blocking, if any.
    #[must_use]
    pub fn try_recv(&self) -> Option<InvocationSpec> {
        self.receiver.try_recv().ok()
    }

    /// Blocks until a spec is available or `timeout` elapses, whichever
    /// comes first. Used by the event loop to poll for cancellation between
    /// waits (spec §5 "Cancellation") without mistaking "empty for now" for
    /// "no sender will ever enqueue again".
    #[must_use]
    pub fn poll(&self, timeout: Duration) -> MailboxEvent {
        match self.receiver.recv_timeout(timeout) {
            Ok(spec) => MailboxEvent::Spec(spec),
            Err(mpsc::RecvTimeoutError::Timeout) => MailboxEvent::Timeout,
            Err(mpsc::RecvTimeoutError::Disconnected) => MailboxEvent::Disconnected,
        }
    }
}

/// The outcome of [`MailboxReceiver::poll`].
#[derive(Debug)]
pub enum MailboxEvent {
    /// A spec was dequeued.
    Spec(InvocationSpec),
    /// No spec arrived before the timeout; senders may still be alive.
    Timeout,
    /// Every sender has been dropped; no further specs can ever arrive.
    Disconnected,
}

/// Creates a connected mailbox sender/receiver pair.
#[must_use]
pub fn channel() -> (MailboxSender, MailboxReceiver) {
    let (sender, receiver) = mpsc::channel();
    (
        MailboxSender {
            sender,
        },
        MailboxReceiver {
            receiver,
        },
    )
}
