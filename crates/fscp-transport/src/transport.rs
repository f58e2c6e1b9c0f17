//! Transport trait abstraction for the datagram socket.
//!
//! The engine owns exactly one transport; the trait exists so tests can
//! substitute lossy or scripted transports without touching protocol code.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport is closed
    #[error("transport is closed")]
    Closed,

    /// Address binding failed
    #[error("failed to bind to address: {0}")]
    BindFailed(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Counters kept by every transport implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Total datagrams sent
    pub packets_sent: u64,
    /// Total datagrams received
    pub packets_received: u64,
    /// Send operations that failed
    pub send_errors: u64,
    /// Receive operations that failed
    pub recv_errors: u64,
}

/// Async datagram transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a datagram to a remote address, returning the bytes sent.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the send fails or the transport is closed.
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize>;

    /// Receive one datagram, returning its size and the sender's address.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the receive fails or the transport is
    /// closed.
    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)>;

    /// The local address this transport is bound to.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the address cannot be determined.
    fn local_addr(&self) -> TransportResult<SocketAddr>;

    /// Close the transport; subsequent operations return
    /// `TransportError::Closed`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if closing fails.
    async fn close(&self) -> TransportResult<()>;

    /// Whether the transport has been closed
    fn is_closed(&self) -> bool;

    /// Transport statistics
    fn stats(&self) -> TransportStats;
}
