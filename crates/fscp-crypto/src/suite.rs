//! Cipher suite and elliptic curve negotiation enumerations.
//!
//! Wire codes follow the session handshake encoding: one byte per
//! capability, listed in sender preference order.

use crate::CryptoError;
use std::fmt;

/// A negotiable pairing of AEAD algorithm and KDF hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CipherSuite {
    /// ECDHE + RSASSA-PSS authentication, AES-128-GCM, HKDF-SHA-256
    EcdheRsaAes128GcmSha256 = 0x01,
    /// ECDHE + RSASSA-PSS authentication, AES-256-GCM, HKDF-SHA-384
    EcdheRsaAes256GcmSha384 = 0x02,
}

impl CipherSuite {
    /// All suites this build can actually negotiate, strongest first
    pub const ALL: [CipherSuite; 2] = [
        CipherSuite::EcdheRsaAes256GcmSha384,
        CipherSuite::EcdheRsaAes128GcmSha256,
    ];

    /// Wire code of this suite
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// AEAD key length in bytes
    #[must_use]
    pub fn key_len(self) -> usize {
        match self {
            CipherSuite::EcdheRsaAes128GcmSha256 => 16,
            CipherSuite::EcdheRsaAes256GcmSha384 => 32,
        }
    }

    /// AEAD authentication tag length in bytes
    #[must_use]
    pub fn tag_len(self) -> usize {
        16
    }

    /// AEAD nonce width in bytes
    #[must_use]
    pub fn nonce_len(self) -> usize {
        12
    }
}

impl TryFrom<u8> for CipherSuite {
    type Error = CryptoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(CipherSuite::EcdheRsaAes128GcmSha256),
            0x02 => Ok(CipherSuite::EcdheRsaAes256GcmSha384),
            other => Err(CryptoError::UnsupportedCipherSuite(other)),
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CipherSuite::EcdheRsaAes128GcmSha256 => "ecdhe_rsa_aes128_gcm_sha256",
            CipherSuite::EcdheRsaAes256GcmSha384 => "ecdhe_rsa_aes256_gcm_sha384",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for CipherSuite {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ecdhe_rsa_aes128_gcm_sha256" => Ok(CipherSuite::EcdheRsaAes128GcmSha256),
            "ecdhe_rsa_aes256_gcm_sha384" => Ok(CipherSuite::EcdheRsaAes256GcmSha384),
            _ => Err(CryptoError::UnsupportedCipherSuite(0)),
        }
    }
}

/// A negotiable elliptic curve for the ephemeral key agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EllipticCurve {
    /// Binary Koblitz curve; kept for wire compatibility, no local backend
    Sect571k1 = 0x01,
    /// NIST P-384
    Secp384r1 = 0x02,
    /// NIST P-521
    Secp521r1 = 0x03,
}

impl EllipticCurve {
    /// Curves this build can generate ephemeral keys on, strongest first
    pub const SUPPORTED: [EllipticCurve; 2] = [EllipticCurve::Secp521r1, EllipticCurve::Secp384r1];

    /// Wire code of this curve
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether a key-agreement backend exists for this curve
    #[must_use]
    pub fn is_supported(self) -> bool {
        !matches!(self, EllipticCurve::Sect571k1)
    }

    /// SEC1 uncompressed public key length in bytes
    #[must_use]
    pub fn public_key_len(self) -> usize {
        match self {
            EllipticCurve::Sect571k1 => 145,
            EllipticCurve::Secp384r1 => 97,
            EllipticCurve::Secp521r1 => 133,
        }
    }
}

impl TryFrom<u8> for EllipticCurve {
    type Error = CryptoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(EllipticCurve::Sect571k1),
            0x02 => Ok(EllipticCurve::Secp384r1),
            0x03 => Ok(EllipticCurve::Secp521r1),
            other => Err(CryptoError::UnsupportedEllipticCurve(other)),
        }
    }
}

impl fmt::Display for EllipticCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EllipticCurve::Sect571k1 => "sect571k1",
            EllipticCurve::Secp384r1 => "secp384r1",
            EllipticCurve::Secp521r1 => "secp521r1",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for EllipticCurve {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sect571k1" => Ok(EllipticCurve::Sect571k1),
            "secp384r1" => Ok(EllipticCurve::Secp384r1),
            "secp521r1" => Ok(EllipticCurve::Secp521r1),
            _ => Err(CryptoError::UnsupportedEllipticCurve(0)),
        }
    }
}

/// Pick the first (suite, curve) pair acceptable to both sides.
///
/// `ours` are scanned in local preference order; the remote lists are
/// membership sets. Curves without a local backend never match.
#[must_use]
pub fn select_parameters(
    our_suites: &[CipherSuite],
    our_curves: &[EllipticCurve],
    their_suites: &[CipherSuite],
    their_curves: &[EllipticCurve],
) -> Option<(CipherSuite, EllipticCurve)> {
    let suite = our_suites.iter().find(|cs| their_suites.contains(cs))?;
    let curve = our_curves
        .iter()
        .find(|ec| ec.is_supported() && their_curves.contains(ec))?;
    Some((*suite, *curve))
}
