//! RSASSA-PSS detached signatures for the session handshake.
//!
//! Salt length equals the digest length. `SESSION_REQUEST` is always signed
//! with SHA-256 (no suite has been agreed yet); `SESSION` uses the chosen
//! suite's hash.

use crate::{CipherSuite, CryptoError};
use rsa::pss::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384};

/// Digest used by a PSS signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureHash {
    /// SHA-256 (handshake default, AES-128 suite)
    Sha256,
    /// SHA-384 (AES-256 suite)
    Sha384,
}

impl From<CipherSuite> for SignatureHash {
    fn from(suite: CipherSuite) -> Self {
        match suite {
            CipherSuite::EcdheRsaAes128GcmSha256 => SignatureHash::Sha256,
            CipherSuite::EcdheRsaAes256GcmSha384 => SignatureHash::Sha384,
        }
    }
}

/// Sign `message` with RSASSA-PSS.
///
/// # Errors
///
/// Returns `CryptoError::SigningFailed` if the key is unusable.
pub fn sign_pss(
    key: &RsaPrivateKey,
    hash: SignatureHash,
    message: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut rng = rand_core::OsRng;

    let signature = match hash {
        SignatureHash::Sha256 => SigningKey::<Sha256>::new(key.clone())
            .try_sign_with_rng(&mut rng, message)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?,
        SignatureHash::Sha384 => SigningKey::<Sha384>::new(key.clone())
            .try_sign_with_rng(&mut rng, message)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?,
    };

    Ok(signature.to_vec())
}

/// Verify an RSASSA-PSS signature over `message`.
///
/// # Errors
///
/// Returns `CryptoError::BadSignature` if the signature is malformed or does
/// not verify under `key`.
pub fn verify_pss(
    key: &RsaPublicKey,
    hash: SignatureHash,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let signature = Signature::try_from(signature).map_err(|_| CryptoError::BadSignature)?;

    let verified = match hash {
        SignatureHash::Sha256 => {
            VerifyingKey::<Sha256>::new(key.clone()).verify(message, &signature)
        }
        SignatureHash::Sha384 => {
            VerifyingKey::<Sha384>::new(key.clone()).verify(message, &signature)
        }
    };

    verified.map_err(|_| CryptoError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;

    fn test_key() -> RsaPrivateKey {
        // 2048-bit keygen is slow in debug builds; share one key per test run.
        use std::sync::OnceLock;
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| {
            RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("rsa keygen")
        })
        .clone()
    }

    #[test]
    fn test_sign_verify_sha256() {
        let key = test_key();
        let sig = sign_pss(&key, SignatureHash::Sha256, b"handshake body").unwrap();
        assert_eq!(sig.len(), key.to_public_key().size());
        verify_pss(
            &key.to_public_key(),
            SignatureHash::Sha256,
            b"handshake body",
            &sig,
        )
        .unwrap();
    }

    #[test]
    fn test_sign_verify_sha384() {
        let key = test_key();
        let sig = sign_pss(&key, SignatureHash::Sha384, b"session body").unwrap();
        verify_pss(
            &key.to_public_key(),
            SignatureHash::Sha384,
            b"session body",
            &sig,
        )
        .unwrap();
    }

    #[test]
    fn test_hash_mismatch_fails() {
        let key = test_key();
        let sig = sign_pss(&key, SignatureHash::Sha256, b"body").unwrap();
        assert!(verify_pss(&key.to_public_key(), SignatureHash::Sha384, b"body", &sig).is_err());
    }

    #[test]
    fn test_tampered_message_fails() {
        let key = test_key();
        let sig = sign_pss(&key, SignatureHash::Sha256, b"body").unwrap();
        assert!(matches!(
            verify_pss(&key.to_public_key(), SignatureHash::Sha256, b"Body", &sig),
            Err(CryptoError::BadSignature)
        ));
    }

    #[test]
    fn test_suite_hash_mapping() {
        assert_eq!(
            SignatureHash::from(CipherSuite::EcdheRsaAes128GcmSha256),
            SignatureHash::Sha256
        );
        assert_eq!(
            SignatureHash::from(CipherSuite::EcdheRsaAes256GcmSha384),
            SignatureHash::Sha384
        );
    }
}
