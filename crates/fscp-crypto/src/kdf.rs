//! Session key schedule.
//!
//! Both directions of a session derive an AEAD key and a 7-byte nonce prefix
//! from the ECDH shared secret via HKDF with the suite's hash. The direction
//! is bound into the `info` string through the *sender's* host identifier, so
//! both hosts compute identical schedules without a role negotiation.

use crate::{CipherSuite, CryptoError};
use hkdf::Hkdf;
use sha2::{Sha256, Sha384};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Nonce prefix length; `prefix(7) | channel(1) | sequence(4)` fills the
/// 96-bit AEAD nonce.
pub const NONCE_PREFIX_LEN: usize = 7;

const KEY_LABEL: &[u8] = b"fscp key";
const NONCE_LABEL: &[u8] = b"fscp nonce";

/// Key material for one direction of a session
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DirectionKeys {
    /// AEAD key (length set by the suite)
    pub key: Vec<u8>,
    /// Per-direction nonce prefix
    pub nonce_prefix: [u8; NONCE_PREFIX_LEN],
}

/// Full key schedule for one session
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Keys protecting frames we emit
    pub local_to_remote: DirectionKeys,
    /// Keys protecting frames the peer emits
    pub remote_to_local: DirectionKeys,
}

/// Derive the session key schedule from an ECDH shared secret.
///
/// `session_number` salts the extraction so renegotiations under the same
/// long-term identities yield unrelated schedules.
///
/// # Errors
///
/// Returns `CryptoError::KdfFailed` if expansion fails (cannot happen for the
/// lengths used here, kept for defence in depth of the API contract).
pub fn derive_session_keys(
    suite: CipherSuite,
    shared_secret: &[u8],
    session_number: u32,
    local_host_identifier: &[u8; 32],
    remote_host_identifier: &[u8; 32],
) -> Result<SessionKeys, CryptoError> {
    let salt = session_number.to_be_bytes();

    let local_to_remote = derive_direction(suite, shared_secret, &salt, local_host_identifier)?;
    let remote_to_local = derive_direction(suite, shared_secret, &salt, remote_host_identifier)?;

    Ok(SessionKeys {
        local_to_remote,
        remote_to_local,
    })
}

fn derive_direction(
    suite: CipherSuite,
    shared_secret: &[u8],
    salt: &[u8],
    sender_host_identifier: &[u8; 32],
) -> Result<DirectionKeys, CryptoError> {
    let mut key = vec![0u8; suite.key_len()];
    let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];

    let mut key_info = Vec::with_capacity(KEY_LABEL.len() + 32);
    key_info.extend_from_slice(KEY_LABEL);
    key_info.extend_from_slice(sender_host_identifier);

    let mut nonce_info = Vec::with_capacity(NONCE_LABEL.len() + 32);
    nonce_info.extend_from_slice(NONCE_LABEL);
    nonce_info.extend_from_slice(sender_host_identifier);

    match suite {
        CipherSuite::EcdheRsaAes128GcmSha256 => {
            let hk = Hkdf::<Sha256>::new(Some(salt), shared_secret);
            hk.expand(&key_info, &mut key)
                .map_err(|_| CryptoError::KdfFailed)?;
            hk.expand(&nonce_info, &mut nonce_prefix)
                .map_err(|_| CryptoError::KdfFailed)?;
        }
        CipherSuite::EcdheRsaAes256GcmSha384 => {
            let hk = Hkdf::<Sha384>::new(Some(salt), shared_secret);
            hk.expand(&key_info, &mut key)
                .map_err(|_| CryptoError::KdfFailed)?;
            hk.expand(&nonce_info, &mut nonce_prefix)
                .map_err(|_| CryptoError::KdfFailed)?;
        }
    }

    Ok(DirectionKeys { key, nonce_prefix })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; 48] = [0xA5; 48];
    const HOST_A: [u8; 32] = [0x01; 32];
    const HOST_B: [u8; 32] = [0x02; 32];

    #[test]
    fn test_schedules_mirror_between_hosts() {
        for suite in CipherSuite::ALL {
            let a = derive_session_keys(suite, &SECRET, 7, &HOST_A, &HOST_B).unwrap();
            let b = derive_session_keys(suite, &SECRET, 7, &HOST_B, &HOST_A).unwrap();

            // A's send keys are B's receive keys and vice versa.
            assert_eq!(a.local_to_remote.key, b.remote_to_local.key);
            assert_eq!(a.local_to_remote.nonce_prefix, b.remote_to_local.nonce_prefix);
            assert_eq!(a.remote_to_local.key, b.local_to_remote.key);
        }
    }

    #[test]
    fn test_directions_differ() {
        let keys = derive_session_keys(
            CipherSuite::EcdheRsaAes128GcmSha256,
            &SECRET,
            1,
            &HOST_A,
            &HOST_B,
        )
        .unwrap();
        assert_ne!(keys.local_to_remote.key, keys.remote_to_local.key);
        assert_ne!(
            keys.local_to_remote.nonce_prefix,
            keys.remote_to_local.nonce_prefix
        );
    }

    #[test]
    fn test_session_number_separates_schedules() {
        let k1 = derive_session_keys(
            CipherSuite::EcdheRsaAes256GcmSha384,
            &SECRET,
            1,
            &HOST_A,
            &HOST_B,
        )
        .unwrap();
        let k2 = derive_session_keys(
            CipherSuite::EcdheRsaAes256GcmSha384,
            &SECRET,
            2,
            &HOST_A,
            &HOST_B,
        )
        .unwrap();
        assert_ne!(k1.local_to_remote.key, k2.local_to_remote.key);
    }

    #[test]
    fn test_key_lengths_follow_suite() {
        let keys = derive_session_keys(
            CipherSuite::EcdheRsaAes256GcmSha384,
            &SECRET,
            1,
            &HOST_A,
            &HOST_B,
        )
        .unwrap();
        assert_eq!(keys.local_to_remote.key.len(), 32);

        let keys = derive_session_keys(
            CipherSuite::EcdheRsaAes128GcmSha256,
            &SECRET,
            1,
            &HOST_A,
            &HOST_B,
        )
        .unwrap();
        assert_eq!(keys.local_to_remote.key.len(), 16);
    }
}
