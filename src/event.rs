//! Gate event system.
//!
//! Every authorization outcome is broadcast so an operator can attach an
//! audit log or metrics without touching the request path.

use crate::invoice::PaymentHash;
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Events emitted by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// Server is listening.
    Started {
        /// Bound address.
        addr: SocketAddr,
    },

    /// Server is shutting down.
    ShuttingDown,

    /// A 402 challenge with a fresh invoice was issued.
    ChallengeIssued {
        /// Hash of the new invoice.
        payment_hash: PaymentHash,
        /// Amount invoiced.
        amount: u64,
    },

    /// A token was accepted.
    AccessGranted {
        /// Hash of the invoice backing the token.
        payment_hash: PaymentHash,
        /// Path that was accessed.
        path: String,
    },

    /// A request was refused.
    AccessDenied {
        /// Hash of the invoice, when the token got far enough to tell.
        payment_hash: Option<PaymentHash>,
        /// Stable reason code.
        reason: &'static str,
    },
}

/// Channel for receiving gate events.
pub type GateEventsChannel = broadcast::Receiver<GateEvent>;

/// Sender for gate events.
pub type GateEventsSender = broadcast::Sender<GateEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (GateEventsSender, GateEventsChannel) {
    broadcast::channel(256)
}
