//! # FSCP Crypto
//!
//! Cryptographic primitives for the FSCP engine.
//!
//! This crate provides:
//! - Cipher suite and elliptic curve negotiation enumerations
//! - AES-GCM AEAD encryption for data messages
//! - HKDF session key schedule
//! - RSASSA-PSS handshake signatures
//! - X.509 certificate parsing, trust validation and identity storage
//! - Ephemeral ECDHE key agreement
//! - Secure random number generation and constant-time comparison
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm |
//! |----------|-----------|
//! | Key Exchange | ECDHE on secp384r1 / secp521r1 |
//! | AEAD | AES-128-GCM / AES-256-GCM |
//! | KDF | HKDF-SHA-256 / HKDF-SHA-384 |
//! | Handshake Signatures | RSASSA-PSS (salt = digest length) |
//! | Certificates | X.509 with RSA keys |
//! | Fingerprints | SHA-256 over DER |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aead;
pub mod constant_time;
pub mod ecdhe;
pub mod error;
pub mod kdf;
pub mod random;
pub mod signature;
pub mod suite;
pub mod x509;

#[cfg(any(test, feature = "test-util"))]
pub mod test_certificates;

pub use aead::AeadCipher;
pub use ecdhe::EphemeralKeyPair;
pub use error::CryptoError;
pub use kdf::{derive_session_keys, DirectionKeys, SessionKeys, NONCE_PREFIX_LEN};
pub use signature::{sign_pss, verify_pss, SignatureHash};
pub use suite::{select_parameters, CipherSuite, EllipticCurve};
pub use x509::{Certificate, Fingerprint, IdentityStore, TrustStore};

// Re-exported so dependants use one `rsa` version.
pub use rsa::{RsaPrivateKey, RsaPublicKey};

/// Host identifier size in bytes
pub const HOST_IDENTIFIER_SIZE: usize = 32;

/// Certificate fingerprint size in bytes (SHA-256)
pub const FINGERPRINT_SIZE: usize = 32;

/// AEAD authentication tag size in bytes
pub const AUTH_TAG_SIZE: usize = 16;

/// AEAD nonce size in bytes
pub const NONCE_SIZE: usize = 12;
