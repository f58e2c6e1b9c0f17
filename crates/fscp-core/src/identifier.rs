//! Host identifiers.
//!
//! A host picks a 32-byte identifier uniformly at random at startup and
//! carries it in every handshake. Peers use it to detect restarts without
//! waiting for key timeouts, and to break simultaneous-rekey ties.

use fscp_crypto::random::random_32;
use fscp_crypto::CryptoError;
use std::fmt;

/// A 32-byte random value identifying one process incarnation
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostIdentifier([u8; 32]);

impl HostIdentifier {
    /// Generate a fresh identifier from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RandomFailed` if the random source fails.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self(random_32()?))
    }

    /// Wrap raw bytes (wire decoding)
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lexicographic tie-break: `true` if this host wins against `other`.
    ///
    /// The lower identifier wins a simultaneous session proposal.
    #[must_use]
    pub fn wins_against(&self, other: &HostIdentifier) -> bool {
        self.0 < other.0
    }
}

impl fmt::Debug for HostIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostIdentifier({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for HostIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}
