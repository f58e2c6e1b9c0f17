//! Normalized peer endpoints.
//!
//! An endpoint is an (IP, UDP port) pair. IPv4-mapped IPv6 addresses are
//! stored in their IPv4 form so that the same host reached over a dual-stack
//! socket always keys the same peer record. Equality, hashing and ordering
//! operate on the normalized form.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// A normalized (IP, UDP port) pair; the key of every peer lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Normalize and wrap a socket address
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
                Some(v4) => Self(SocketAddr::new(IpAddr::V4(v4), v6.port())),
                None => Self(addr),
            },
            SocketAddr::V4(_) => Self(addr),
        }
    }

    /// The normalized socket address
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.0
    }

    /// The IP part
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    /// The UDP port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.0.port()
    }

    fn ordering_key(&self) -> (u8, [u8; 16], u16) {
        match self.0.ip() {
            IpAddr::V4(v4) => {
                let mut bytes = [0u8; 16];
                bytes[..4].copy_from_slice(&v4.octets());
                (4, bytes, self.0.port())
            }
            IpAddr::V6(v6) => (6, v6.octets(), self.0.port()),
        }
    }
}

impl Ord for Endpoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordering_key().cmp(&other.ordering_key())
    }
}

impl PartialOrd for Endpoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl FromStr for Endpoint {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s.parse()?))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
