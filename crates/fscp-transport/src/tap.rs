//! TAP frame pipe abstraction.
//!
//! The engine consumes frames through this trait and never learns whether a
//! real kernel TAP/TUN device, a user-space stack or a test harness sits
//! behind it. Platform adapters implement it out of tree; `MemoryTap` backs
//! tests and samples.

use async_trait::async_trait;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// A MAC address
pub type EthernetAddress = [u8; 6];

/// TAP errors
#[derive(Debug, thiserror::Error)]
pub enum TapError {
    /// I/O error from the device
    #[error("tap I/O error: {0}")]
    Io(#[from] io::Error),

    /// The device has been shut down
    #[error("tap device closed")]
    Closed,
}

/// Result type for TAP operations
pub type TapResult<T> = Result<T, TapError>;

/// Addressing and MTU applied to the device at engine start
#[derive(Debug, Clone, Default)]
pub struct TapConfiguration {
    /// IPv4 address and prefix length
    pub ipv4: Option<(std::net::Ipv4Addr, u8)>,
    /// IPv6 address and prefix length
    pub ipv6: Option<(std::net::Ipv6Addr, u8)>,
    /// MTU in bytes
    pub mtu: Option<usize>,
}

/// Bidirectional frame pipe to the local network stack.
///
/// `read_frame` yields frames lazily and only returns `TapError::Closed`
/// once the device is shut down.
#[async_trait]
pub trait TapDevice: Send + Sync {
    /// Read one frame into `buf`, returning its length.
    ///
    /// # Errors
    ///
    /// Returns `TapError::Closed` on shutdown, `TapError::Io` on device
    /// failure.
    async fn read_frame(&self, buf: &mut [u8]) -> TapResult<usize>;

    /// Write one frame to the device.
    ///
    /// # Errors
    ///
    /// Returns `TapError::Closed` on shutdown, `TapError::Io` on device
    /// failure.
    async fn write_frame(&self, frame: &[u8]) -> TapResult<()>;

    /// The device's MAC address
    fn ethernet_address(&self) -> EthernetAddress;

    /// Apply addressing and MTU.
    ///
    /// # Errors
    ///
    /// Returns `TapError::Io` if the platform rejects the configuration.
    async fn configure(&self, config: TapConfiguration) -> TapResult<()>;

    /// Signal link state (up/down) to the platform.
    async fn set_connected(&self, connected: bool);

    /// Add an address to the device.
    ///
    /// # Errors
    ///
    /// Returns `TapError::Io` if the platform rejects the address.
    async fn add_ip(&self, addr: IpAddr, prefix_len: u8) -> TapResult<()>;

    /// Remove an address from the device.
    ///
    /// # Errors
    ///
    /// Returns `TapError::Io` if the platform rejects the removal.
    async fn remove_ip(&self, addr: IpAddr, prefix_len: u8) -> TapResult<()>;
}

/// In-memory TAP backed by channels.
///
/// Frames written by the engine appear on [`MemoryTapHandle::outbound`];
/// frames injected through [`MemoryTapHandle::inject`] are read by the
/// engine.
pub struct MemoryTap {
    mac: EthernetAddress,
    from_stack: Mutex<mpsc::Receiver<Vec<u8>>>,
    to_stack: mpsc::Sender<Vec<u8>>,
    connected: AtomicBool,
    closed: AtomicBool,
}

/// Test-side handle of a [`MemoryTap`]
pub struct MemoryTapHandle {
    inject_tx: mpsc::Sender<Vec<u8>>,
    outbound_rx: mpsc::Receiver<Vec<u8>>,
}

impl MemoryTap {
    /// Create a memory TAP with the given MAC address.
    ///
    /// Returns the device (engine side) and its test handle.
    #[must_use]
    pub fn new(mac: EthernetAddress) -> (Arc<Self>, MemoryTapHandle) {
        let (inject_tx, inject_rx) = mpsc::channel(256);
        let (outbound_tx, outbound_rx) = mpsc::channel(256);

        let tap = Arc::new(Self {
            mac,
            from_stack: Mutex::new(inject_rx),
            to_stack: outbound_tx,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        (
            tap,
            MemoryTapHandle {
                inject_tx,
                outbound_rx,
            },
        )
    }

    /// Whether the engine has signalled link-up
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Shut the device down; pending reads complete with `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

impl MemoryTapHandle {
    /// Inject a frame as if the local stack emitted it.
    ///
    /// # Errors
    ///
    /// Returns `TapError::Closed` if the device side is gone.
    pub async fn inject(&self, frame: Vec<u8>) -> TapResult<()> {
        self.inject_tx
            .send(frame)
            .await
            .map_err(|_| TapError::Closed)
    }

    /// Receive the next frame the engine delivered to the local stack.
    pub async fn outbound(&mut self) -> Option<Vec<u8>> {
        self.outbound_rx.recv().await
    }
}

#[async_trait]
impl TapDevice for MemoryTap {
    async fn read_frame(&self, buf: &mut [u8]) -> TapResult<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TapError::Closed);
        }

        let mut rx = self.from_stack.lock().await;
        match rx.recv().await {
            Some(frame) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(n)
            }
            None => Err(TapError::Closed),
        }
    }

    async fn write_frame(&self, frame: &[u8]) -> TapResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TapError::Closed);
        }

        self.to_stack
            .send(frame.to_vec())
            .await
            .map_err(|_| TapError::Closed)
    }

    fn ethernet_address(&self) -> EthernetAddress {
        self.mac
    }

    async fn configure(&self, _config: TapConfiguration) -> TapResult<()> {
        Ok(())
    }

    async fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    async fn add_ip(&self, _addr: IpAddr, _prefix_len: u8) -> TapResult<()> {
        Ok(())
    }

    async fn remove_ip(&self, _addr: IpAddr, _prefix_len: u8) -> TapResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_tap_roundtrip() {
        let (tap, mut handle) = MemoryTap::new([0xAA, 0xBB, 0xCC, 0x00, 0x00, 0x01]);

        handle.inject(vec![1, 2, 3, 4]).await.unwrap();

        let mut buf = [0u8; 1500];
        let n = tap.read_frame(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3, 4]);

        tap.write_frame(&[9, 8, 7]).await.unwrap();
        assert_eq!(handle.outbound().await.unwrap(), vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn test_memory_tap_connected_state() {
        let (tap, _handle) = MemoryTap::new([0; 6]);
        assert!(!tap.is_connected());
        tap.set_connected(true).await;
        assert!(tap.is_connected());
    }

    #[tokio::test]
    async fn test_memory_tap_close() {
        let (tap, _handle) = MemoryTap::new([0; 6]);
        tap.close();

        let mut buf = [0u8; 16];
        assert!(matches!(
            tap.read_frame(&mut buf).await,
            Err(TapError::Closed)
        ));
        assert!(matches!(
            tap.write_frame(&[0]).await,
            Err(TapError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_memory_tap_mac() {
        let mac = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01];
        let (tap, _handle) = MemoryTap::new(mac);
        assert_eq!(tap.ethernet_address(), mac);
    }
}
