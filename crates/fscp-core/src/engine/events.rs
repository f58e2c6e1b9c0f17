//! Engine lifecycle events.
//!
//! Broadcast to the daemon (for logging and administrative side-effects) and
//! to tests. Lagging subscribers lose old events, never block the engine.

use crate::endpoint::Endpoint;
use fscp_crypto::Fingerprint;

/// Why a presentation was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationRejection {
    /// Certificate does not chain to a trust anchor
    Untrusted,
    /// Certificate outside its validity window
    Expired,
    /// Certificate names or key usages do not line up
    Mismatch,
    /// Presentation from an endpoint we never exchanged hellos with
    Unsolicited,
    /// Certificates changed while rotation is disabled
    RotationRefused,
}

/// Engine lifecycle notifications
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A session with this peer is keyed and usable
    SessionEstablished {
        /// The peer
        endpoint: Endpoint,
        /// The agreed session number
        session_number: u32,
    },
    /// The session with this peer was dropped
    SessionLost {
        /// The peer
        endpoint: Endpoint,
    },
    /// A presentation was refused
    PresentationRejected {
        /// The presenting endpoint
        endpoint: Endpoint,
        /// Why
        reason: PresentationRejection,
    },
    /// A contact exchange yielded an endpoint hint
    ContactLearned {
        /// The hinted peer's signing-certificate fingerprint
        fingerprint: Fingerprint,
        /// Where it was last reachable
        endpoint: Endpoint,
    },
    /// A session negotiation gave up after its retry budget
    NegotiationTimedOut {
        /// The peer
        endpoint: Endpoint,
    },
    /// An endpoint entered its blacklist cool-down
    PeerBlacklisted {
        /// The endpoint
        endpoint: Endpoint,
    },
}
