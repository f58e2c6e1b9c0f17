//! Error types for the FSCP cryptographic layer.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption or tag verification failed
    #[error("decryption failed (bad tag or corrupted ciphertext)")]
    DecryptionFailed,

    /// Signature creation failed
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Signature did not verify
    #[error("signature verification failed")]
    BadSignature,

    /// Key derivation produced an invalid length
    #[error("key derivation failed")]
    KdfFailed,

    /// ECDH key agreement failed (bad point or wrong curve)
    #[error("key agreement failed")]
    AgreementFailed,

    /// Unknown or unsupported cipher suite code
    #[error("unsupported cipher suite: 0x{0:02X}")]
    UnsupportedCipherSuite(u8),

    /// Unknown or unsupported elliptic curve code
    #[error("unsupported elliptic curve: 0x{0:02X}")]
    UnsupportedEllipticCurve(u8),

    /// Certificate could not be parsed
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    /// Private key could not be parsed
    #[error("malformed private key: {0}")]
    MalformedKey(String),

    /// The certificate public key is not an RSA key
    #[error("certificate public key is not RSA")]
    NotAnRsaKey,

    /// The OS random source failed
    #[error("random source failure")]
    RandomFailed,
}
