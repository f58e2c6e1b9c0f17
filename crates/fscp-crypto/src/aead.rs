//! AES-GCM AEAD encryption for data messages.
//!
//! The cipher variant is chosen by the negotiated suite; both directions of a
//! session hold one cipher each, keyed from the HKDF schedule.

use crate::{CipherSuite, CryptoError};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};

enum Inner {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

/// AEAD cipher for one direction of a session
pub struct AeadCipher {
    inner: Inner,
}

impl AeadCipher {
    /// Create a cipher for the given suite.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KdfFailed` if `key` does not match the suite's
    /// key length.
    pub fn new(suite: CipherSuite, key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != suite.key_len() {
            return Err(CryptoError::KdfFailed);
        }

        let inner = match suite {
            CipherSuite::EcdheRsaAes128GcmSha256 => Inner::Aes128(
                Aes128Gcm::new_from_slice(key).map_err(|_| CryptoError::KdfFailed)?,
            ),
            CipherSuite::EcdheRsaAes256GcmSha384 => Inner::Aes256(
                Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::KdfFailed)?,
            ),
        };

        Ok(Self { inner })
    }

    /// Encrypt plaintext with the given 96-bit nonce and associated data.
    ///
    /// Returns ciphertext with the 16-byte tag appended.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` on AEAD failure.
    pub fn encrypt(
        &self,
        nonce: &[u8; 12],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let payload = Payload {
            msg: plaintext,
            aad,
        };

        match &self.inner {
            Inner::Aes128(c) => c.encrypt(Nonce::from_slice(nonce), payload),
            Inner::Aes256(c) => c.encrypt(Nonce::from_slice(nonce), payload),
        }
        .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt ciphertext (with trailing tag) under the given nonce and
    /// associated data.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` if the tag does not verify.
    pub fn decrypt(
        &self,
        nonce: &[u8; 12],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let payload = Payload {
            msg: ciphertext,
            aad,
        };

        match &self.inner {
            Inner::Aes128(c) => c.decrypt(Nonce::from_slice(nonce), payload),
            Inner::Aes256(c) => c.decrypt(Nonce::from_slice(nonce), payload),
        }
        .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(suite: CipherSuite) {
        let key = vec![0x42u8; suite.key_len()];
        let nonce = [0x07u8; 12];
        let cipher = AeadCipher::new(suite, &key).unwrap();

        let ct = cipher.encrypt(&nonce, b"frame bytes", b"header").unwrap();
        assert_eq!(ct.len(), 11 + suite.tag_len());

        let pt = cipher.decrypt(&nonce, &ct, b"header").unwrap();
        assert_eq!(pt, b"frame bytes");
    }

    #[test]
    fn test_aes128_roundtrip() {
        roundtrip(CipherSuite::EcdheRsaAes128GcmSha256);
    }

    #[test]
    fn test_aes256_roundtrip() {
        roundtrip(CipherSuite::EcdheRsaAes256GcmSha384);
    }

    #[test]
    fn test_tamper_detection() {
        let key = [0x42u8; 16];
        let nonce = [0u8; 12];
        let cipher = AeadCipher::new(CipherSuite::EcdheRsaAes128GcmSha256, &key).unwrap();

        let mut ct = cipher.encrypt(&nonce, b"data", b"aad").unwrap();
        ct[0] ^= 0xFF;
        assert!(matches!(
            cipher.decrypt(&nonce, &ct, b"aad"),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_aad_mismatch_rejected() {
        let key = [0x42u8; 16];
        let nonce = [0u8; 12];
        let cipher = AeadCipher::new(CipherSuite::EcdheRsaAes128GcmSha256, &key).unwrap();

        let ct = cipher.encrypt(&nonce, b"data", b"aad-1").unwrap();
        assert!(cipher.decrypt(&nonce, &ct, b"aad-2").is_err());
    }

    #[test]
    fn test_wrong_key_length() {
        assert!(AeadCipher::new(CipherSuite::EcdheRsaAes256GcmSha384, &[0u8; 16]).is_err());
    }
}
