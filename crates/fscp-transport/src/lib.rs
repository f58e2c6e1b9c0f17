//! # FSCP Transport
//!
//! Network transport layer for the FSCP engine.
//!
//! This crate provides:
//! - The [`Transport`] trait and its Tokio UDP implementation
//! - The [`TapDevice`] frame-pipe trait the engine consumes frames through
//! - An in-memory TAP for tests and samples
//!
//! Platform TAP/TUN drivers live outside this workspace; anything that can
//! move whole frames implements [`TapDevice`] and plugs into the engine.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod tap;
pub mod transport;
pub mod udp;

pub use tap::{EthernetAddress, MemoryTap, MemoryTapHandle, TapConfiguration, TapDevice, TapError};
pub use transport::{Transport, TransportError, TransportResult, TransportStats};
pub use udp::UdpTransport;
