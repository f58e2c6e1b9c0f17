//! Error types for the FSCP core.
//!
//! The taxonomy mirrors the propagation policy: transport and crypto faults
//! on a single peer never tear the engine down, malformed input is dropped at
//! the parser, policy rejections carry the sub-kind a log reader needs, and
//! state errors identify protocol misuse without killing the peer.

use crate::replay::ReplayError;
use thiserror::Error;

/// Top-level engine error
#[derive(Debug, Error)]
pub enum Error {
    /// Socket-level failure
    #[error("transport error: {0}")]
    Transport(#[from] fscp_transport::TransportError),

    /// TAP read/write failure
    #[error("tap error: {0}")]
    Tap(#[from] fscp_transport::TapError),

    /// Wire format violation
    #[error("malformed message: {0}")]
    Message(#[from] MessageError),

    /// Cryptographic failure
    #[error("crypto error: {0}")]
    Crypto(#[from] fscp_crypto::CryptoError),

    /// Certificate or peer policy rejection
    #[error("policy rejection: {0}")]
    Policy(#[from] PolicyError),

    /// Protocol state violation
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Resource limit reached
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Hello exchange exceeded its retry budget
    #[error("hello timed out")]
    HelloTimeout,

    /// Retransmission budget exceeded
    #[error("operation timed out")]
    Timeout,

    /// Shutdown in progress
    #[error("operation cancelled by shutdown")]
    Cancelled,
}

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wire format violations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// Datagram shorter than required
    #[error("message too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Minimum byte count required
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// Version byte is not the current protocol version
    #[error("unknown protocol version: {0}")]
    UnknownVersion(u8),

    /// Type byte is not a known message type
    #[error("unknown message type: 0x{0:02X}")]
    UnknownType(u8),

    /// Declared body length exceeds the remaining datagram
    #[error("declared length {declared} exceeds remaining {remaining} bytes")]
    LengthOverflow {
        /// Length field value
        declared: usize,
        /// Bytes left after the header
        remaining: usize,
    },

    /// A per-type layout check failed
    #[error("bad {0} layout")]
    BadLayout(&'static str),

    /// The chosen cipher suite code is unknown
    #[error("unknown cipher suite: 0x{0:02X}")]
    UnknownCipherSuite(u8),

    /// The chosen elliptic curve code is unknown
    #[error("unknown elliptic curve: 0x{0:02X}")]
    UnknownEllipticCurve(u8),
}

/// Certificate and peer policy rejections
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// Certificate does not chain to any trust anchor
    #[error("certificate is not trusted")]
    Untrusted,

    /// Certificate is outside its validity window
    #[error("certificate is expired or not yet valid")]
    Expired,

    /// Signing and encryption certificates disagree on names
    #[error("certificate subject/issuer mismatch")]
    NameMismatch,

    /// Peer presented new certificates while rotation is disabled
    #[error("peer certificate rotation refused")]
    RotationRefused,

    /// Presentation arrived from an endpoint we never exchanged hellos with
    #[error("unsolicited presentation")]
    Unsolicited,

    /// No common cipher suite and curve with the peer
    #[error("no acceptable cipher suite / curve combination")]
    NoAcceptableParameters,

    /// Certificate lacks the key usage its role requires
    #[error("certificate key usage does not permit its role")]
    KeyUsage,
}

/// Protocol state violations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// Handshake message arrived out of order
    #[error("out-of-order handshake message")]
    OutOfOrderHandshake,

    /// Data arrived before any session was negotiated
    #[error("session not ready")]
    SessionNotReady,

    /// Proposed session number does not exceed the last accepted one
    #[error("session number regression: proposed {proposed}, last accepted {last}")]
    SessionNumberRegression {
        /// Last session number accepted from this peer
        last: u32,
        /// Number the peer proposed
        proposed: u32,
    },

    /// Sequence number rejected by the replay window
    #[error("replay: {0}")]
    Replay(#[from] ReplayError),

    /// Outbound sequence numbers are exhausted on a channel
    #[error("outbound sequence numbers exhausted on channel {0}")]
    SequenceExhausted(u8),
}

/// Resource limits
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// A bounded queue dropped its oldest entry
    #[error("queue overflow, oldest entry dropped")]
    QueueOverflow,
}
