//! # FSCP Core
//!
//! Core engine of the FreeLAN Secure Channel Protocol: a peer-to-peer VPN
//! tunnelling layer-2/layer-3 frames between mutually authenticated hosts
//! over one authenticated-and-encrypted UDP channel.
//!
//! This crate provides:
//! - **Wire codec**: the 4-byte framing and every typed message body
//! - **Peer sessions**: ECDHE handshake, per-channel sequence numbers and
//!   replay windows, renegotiation and the host-identifier tie break
//! - **Engine**: the single-socket event loop, per-peer actors,
//!   retransmission, keep-alives, the contact exchange and shutdown
//! - **Switchboard**: MAC-learning switch and longest-prefix-match router
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Engine (orchestration)                    │
//! │   socket loop · per-peer actors · timers · contact exchange  │
//! ├──────────────────────────────────────────────────────────────┤
//! │                         PeerState                            │
//! │   certificates · negotiation · current/next session · queue  │
//! ├──────────────────────────────────────────────────────────────┤
//! │                       ActiveSession                          │
//! │   AEAD framing · sequence counters · replay windows          │
//! ├──────────────────────────────────────────────────────────────┤
//! │                     Messages / Framing                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod identifier;
pub mod message;
pub mod messages;
pub mod peer;
pub mod pool;
pub mod replay;
pub mod session;
pub mod switchboard;

pub use config::{EngineConfig, ForwardingMode, ResolutionProtocol};
pub use endpoint::Endpoint;
pub use engine::{Engine, EngineEvent, PresentationRejection};
pub use error::{Error, MessageError, PolicyError, ResourceError, Result, StateError};
pub use identifier::HostIdentifier;
pub use message::{Message, MessageType};
pub use peer::{LocalContext, PeerAction, PeerCertificates, PeerState};
pub use pool::BufferPool;
pub use replay::{ReplayError, ReplayWindow};
pub use session::ActiveSession;
pub use switchboard::{Dispatcher, IpNetwork, Port, Router, Switch};

/// Wire protocol version
pub const PROTOCOL_VERSION: u8 = 3;

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 4;

/// Number of multiplexed data channels per session
pub const CHANNEL_COUNT: usize = 16;

/// Channel carrying user traffic
pub const CHANNEL_DATA: u8 = 0;

/// Reserved channel carrying contact answers
pub const CHANNEL_CONTACT: u8 = 1;

/// Reserved channel carrying contact requests
pub const CHANNEL_CONTACT_REQUEST: u8 = 2;

/// Reserved channel (unused)
pub const CHANNEL_RESERVED: u8 = 3;

/// Channel carrying keep-alives (`DATA_15`)
pub const CHANNEL_KEEPALIVE: u8 = 15;

/// The well-known keep-alive plaintext
pub const KEEP_ALIVE_PAYLOAD: [u8; 32] = [0u8; 32];

/// Largest datagram the engine accepts or builds
pub const MAX_DATAGRAM_SIZE: usize = HEADER_SIZE + u16::MAX as usize;
