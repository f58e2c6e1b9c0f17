//! Per-peer cryptographic session state.
//!
//! An [`ActiveSession`] holds the negotiated parameters, both direction key
//! schedules, the per-channel outbound sequence counters and the per-channel
//! replay windows. It knows how to frame, encrypt and authenticate data
//! messages; everything above it (negotiation, retransmission, dispatch)
//! lives in [`crate::peer`] and [`crate::engine`].

use crate::error::{Error, StateError};
use crate::message::Message;
use crate::messages::{build_data_datagram, data_aad, data_nonce, parse_data_body};
use crate::replay::ReplayWindow;
use crate::{CHANNEL_COUNT, CHANNEL_KEEPALIVE, KEEP_ALIVE_PAYLOAD};
use fscp_crypto::kdf::NONCE_PREFIX_LEN;
use fscp_crypto::{AeadCipher, CipherSuite, CryptoError, EllipticCurve, SessionKeys};
use std::time::{Duration, Instant};

/// A fully keyed session with one peer.
///
/// Created once both SESSION messages have crossed the wire and the ECDH
/// shared secret is derived; usable for sending immediately (provisional) and
/// promoted to current by the peer layer once traffic is received under it.
pub struct ActiveSession {
    session_number: u32,
    suite: CipherSuite,
    curve: EllipticCurve,
    send_cipher: AeadCipher,
    recv_cipher: AeadCipher,
    send_prefix: [u8; NONCE_PREFIX_LEN],
    recv_prefix: [u8; NONCE_PREFIX_LEN],
    send_sequence: [u32; CHANNEL_COUNT],
    replay: [ReplayWindow; CHANNEL_COUNT],
    created_at: Instant,
    last_receive: Instant,
}

impl ActiveSession {
    /// Build a session from a derived key schedule.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KdfFailed` if the key lengths disagree with the
    /// suite.
    pub fn new(
        session_number: u32,
        suite: CipherSuite,
        curve: EllipticCurve,
        keys: &SessionKeys,
    ) -> Result<Self, CryptoError> {
        let now = Instant::now();

        Ok(Self {
            session_number,
            suite,
            curve,
            send_cipher: AeadCipher::new(suite, &keys.local_to_remote.key)?,
            recv_cipher: AeadCipher::new(suite, &keys.remote_to_local.key)?,
            send_prefix: keys.local_to_remote.nonce_prefix,
            recv_prefix: keys.remote_to_local.nonce_prefix,
            send_sequence: [0; CHANNEL_COUNT],
            replay: std::array::from_fn(|_| ReplayWindow::new()),
            created_at: now,
            last_receive: now,
        })
    }

    /// This session's number
    #[must_use]
    pub fn session_number(&self) -> u32 {
        self.session_number
    }

    /// The negotiated cipher suite
    #[must_use]
    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// The negotiated elliptic curve
    #[must_use]
    pub fn curve(&self) -> EllipticCurve {
        self.curve
    }

    /// When the session was keyed
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the peer was last heard under this session.
    ///
    /// Only authenticated receive traffic (keep-alives included) counts, so
    /// our own transmissions cannot keep a dead peer alive.
    #[must_use]
    pub fn last_receive(&self) -> Instant {
        self.last_receive
    }

    /// Whether nothing was received for `timeout`
    #[must_use]
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_receive.elapsed() >= timeout
    }

    /// Encrypt `plaintext` on `channel` into a complete datagram.
    ///
    /// # Errors
    ///
    /// Returns `StateError::SequenceExhausted` once the channel counter
    /// reaches its final value; the caller must renegotiate before sending
    /// more data.
    pub fn encrypt_data(&mut self, channel: u8, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        debug_assert!((channel as usize) < CHANNEL_COUNT);

        let sequence = self.send_sequence[channel as usize];
        if sequence == u32::MAX {
            return Err(StateError::SequenceExhausted(channel).into());
        }

        let nonce = data_nonce(&self.send_prefix, channel, sequence);
        let aad = data_aad(channel, plaintext.len());
        let ciphertext = self.send_cipher.encrypt(&nonce, plaintext, &aad)?;

        self.send_sequence[channel as usize] = sequence + 1;

        Ok(build_data_datagram(channel, sequence, &ciphertext))
    }

    /// Encrypt a keep-alive on its reserved channel.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::encrypt_data`].
    pub fn encrypt_keepalive(&mut self) -> Result<Vec<u8>, Error> {
        self.encrypt_data(CHANNEL_KEEPALIVE, &KEEP_ALIVE_PAYLOAD)
    }

    /// Authenticate and decrypt a data body received on `channel`.
    ///
    /// The replay window is consulted before the AEAD runs and updated only
    /// after the tag verifies.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Replay` for rejected sequence numbers and
    /// `CryptoError::DecryptionFailed` for bad tags.
    pub fn decrypt_data(&mut self, channel: u8, body: &[u8]) -> Result<Vec<u8>, Error> {
        debug_assert!((channel as usize) < CHANNEL_COUNT);

        let data = parse_data_body(body).map_err(Error::Message)?;

        let window = &mut self.replay[channel as usize];
        window
            .check(data.sequence_number)
            .map_err(|e| Error::State(StateError::Replay(e)))?;

        let nonce = data_nonce(&self.recv_prefix, channel, data.sequence_number);
        let plaintext_len = data.ciphertext.len().saturating_sub(fscp_crypto::AUTH_TAG_SIZE);
        let aad = data_aad(channel, plaintext_len);
        let plaintext = self.recv_cipher.decrypt(&nonce, data.ciphertext, &aad)?;

        // The tag verified; only now does the sequence enter the window.
        window
            .accept(data.sequence_number)
            .map_err(|e| Error::State(StateError::Replay(e)))?;
        self.last_receive = Instant::now();

        Ok(plaintext)
    }

    /// Try to decrypt a full datagram (header included) on this session.
    ///
    /// # Errors
    ///
    /// As [`Self::decrypt_data`], plus `MessageError` for framing faults.
    pub fn decrypt_datagram(&mut self, datagram: &[u8]) -> Result<(u8, Vec<u8>), Error> {
        let message = Message::parse(datagram).map_err(Error::Message)?;
        match message.message_type().channel() {
            Some(channel) => Ok((channel, self.decrypt_data(channel, message.body())?)),
            None => Err(Error::State(StateError::SessionNotReady)),
        }
    }

    /// Whether any channel has exhausted its outbound sequence numbers
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.send_sequence.iter().any(|&seq| seq == u32::MAX)
    }

    /// Force a channel's outbound counter (exhaustion testing support)
    pub fn set_send_sequence(&mut self, channel: u8, sequence: u32) {
        self.send_sequence[channel as usize] = sequence;
    }
}

impl std::fmt::Debug for ActiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSession")
            .field("session_number", &self.session_number)
            .field("suite", &self.suite)
            .field("curve", &self.curve)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::HostIdentifier;
    use crate::replay::ReplayError;
    use fscp_crypto::derive_session_keys;

    /// A keyed session pair as both ends of one negotiation would hold it.
    fn session_pair(suite: CipherSuite) -> (ActiveSession, ActiveSession) {
        let secret = [0x5A; 48];
        let host_a = HostIdentifier::from_bytes([1; 32]);
        let host_b = HostIdentifier::from_bytes([2; 32]);

        let keys_a =
            derive_session_keys(suite, &secret, 3, host_a.as_bytes(), host_b.as_bytes()).unwrap();
        let keys_b =
            derive_session_keys(suite, &secret, 3, host_b.as_bytes(), host_a.as_bytes()).unwrap();

        (
            ActiveSession::new(3, suite, EllipticCurve::Secp384r1, &keys_a).unwrap(),
            ActiveSession::new(3, suite, EllipticCurve::Secp384r1, &keys_b).unwrap(),
        )
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        for suite in CipherSuite::ALL {
            let (mut a, mut b) = session_pair(suite);

            let datagram = a.encrypt_data(0, b"ethernet frame bytes").unwrap();
            let (channel, plaintext) = b.decrypt_datagram(&datagram).unwrap();

            assert_eq!(channel, 0);
            assert_eq!(plaintext, b"ethernet frame bytes");
        }
    }

    #[test]
    fn test_both_directions() {
        let (mut a, mut b) = session_pair(CipherSuite::EcdheRsaAes128GcmSha256);

        let to_b = a.encrypt_data(0, b"a to b").unwrap();
        let to_a = b.encrypt_data(0, b"b to a").unwrap();

        assert_eq!(b.decrypt_datagram(&to_b).unwrap().1, b"a to b");
        assert_eq!(a.decrypt_datagram(&to_a).unwrap().1, b"b to a");
    }

    #[test]
    fn test_replay_rejected_stream_unaffected() {
        let (mut a, mut b) = session_pair(CipherSuite::EcdheRsaAes128GcmSha256);

        let first = a.encrypt_data(0, b"one").unwrap();
        b.decrypt_datagram(&first).unwrap();

        // A byte-for-byte copy of an accepted datagram is a replay.
        match b.decrypt_datagram(&first) {
            Err(Error::State(StateError::Replay(ReplayError::Duplicate(0)))) => {}
            other => panic!("expected duplicate replay, got {other:?}"),
        }

        // The legitimate stream continues.
        let second = a.encrypt_data(0, b"two").unwrap();
        assert_eq!(b.decrypt_datagram(&second).unwrap().1, b"two");
    }

    #[test]
    fn test_channels_are_independent() {
        let (mut a, mut b) = session_pair(CipherSuite::EcdheRsaAes256GcmSha384);

        let on_0 = a.encrypt_data(0, b"zero").unwrap();
        let on_5 = a.encrypt_data(5, b"five").unwrap();

        // Same sequence number on both channels; both accepted.
        assert_eq!(b.decrypt_datagram(&on_0).unwrap(), (0, b"zero".to_vec()));
        assert_eq!(b.decrypt_datagram(&on_5).unwrap(), (5, b"five".to_vec()));
    }

    #[test]
    fn test_channel_transplant_rejected() {
        let (mut a, mut b) = session_pair(CipherSuite::EcdheRsaAes128GcmSha256);

        // Re-frame a channel-0 ciphertext as channel 1: nonce and AAD both
        // disagree, so the tag cannot verify.
        let mut datagram = a.encrypt_data(0, b"payload").unwrap();
        datagram[1] = 0x71;

        assert!(matches!(
            b.decrypt_datagram(&datagram),
            Err(Error::Crypto(CryptoError::DecryptionFailed))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let (mut a, mut b) = session_pair(CipherSuite::EcdheRsaAes128GcmSha256);

        let mut datagram = a.encrypt_data(0, b"payload").unwrap();
        let last = datagram.len() - 1;
        datagram[last] ^= 0x01;

        assert!(b.decrypt_datagram(&datagram).is_err());
        // The failed attempt must not have advanced the replay window.
        let legit = a.encrypt_data(0, b"payload 2").unwrap();
        // Sequence 0 was burned by the tampered copy on the send side only;
        // receiver still accepts the next legitimate sequence.
        assert_eq!(b.decrypt_datagram(&legit).unwrap().1, b"payload 2");
    }

    #[test]
    fn test_sequence_exhaustion() {
        let (mut a, _) = session_pair(CipherSuite::EcdheRsaAes128GcmSha256);

        a.set_send_sequence(0, u32::MAX - 1);
        assert!(!a.exhausted());
        a.encrypt_data(0, b"last one").unwrap();
        assert!(a.exhausted());

        assert!(matches!(
            a.encrypt_data(0, b"overflow"),
            Err(Error::State(StateError::SequenceExhausted(0)))
        ));

        // Other channels are unaffected.
        a.encrypt_data(1, b"fine").unwrap();
    }

    #[test]
    fn test_keepalive_roundtrip() {
        let (mut a, mut b) = session_pair(CipherSuite::EcdheRsaAes128GcmSha256);

        let datagram = a.encrypt_keepalive().unwrap();
        let (channel, plaintext) = b.decrypt_datagram(&datagram).unwrap();

        assert_eq!(channel, CHANNEL_KEEPALIVE);
        assert_eq!(plaintext, KEEP_ALIVE_PAYLOAD);
    }

    #[test]
    fn test_wrong_session_keys_fail() {
        let (mut a, _) = session_pair(CipherSuite::EcdheRsaAes128GcmSha256);
        let (_, mut other_b) = {
            // Different shared secret entirely.
            let secret = [0x77; 48];
            let host_a = HostIdentifier::from_bytes([1; 32]);
            let host_b = HostIdentifier::from_bytes([2; 32]);
            let keys_a = derive_session_keys(
                CipherSuite::EcdheRsaAes128GcmSha256,
                &secret,
                3,
                host_a.as_bytes(),
                host_b.as_bytes(),
            )
            .unwrap();
            let keys_b = derive_session_keys(
                CipherSuite::EcdheRsaAes128GcmSha256,
                &secret,
                3,
                host_b.as_bytes(),
                host_a.as_bytes(),
            )
            .unwrap();
            (
                ActiveSession::new(
                    3,
                    CipherSuite::EcdheRsaAes128GcmSha256,
                    EllipticCurve::Secp384r1,
                    &keys_a,
                )
                .unwrap(),
                ActiveSession::new(
                    3,
                    CipherSuite::EcdheRsaAes128GcmSha256,
                    EllipticCurve::Secp384r1,
                    &keys_b,
                )
                .unwrap(),
            )
        };

        let datagram = a.encrypt_data(0, b"secret").unwrap();
        assert!(other_b.decrypt_datagram(&datagram).is_err());
    }

    #[test]
    fn test_idle_tracking_follows_receives() {
        let (mut a, mut b) = session_pair(CipherSuite::EcdheRsaAes128GcmSha256);
        assert!(b.is_idle(Duration::ZERO));

        let datagram = a.encrypt_data(0, b"touch").unwrap();
        // Sending does not refresh the sender's idle clock.
        assert!(a.is_idle(Duration::ZERO));

        b.decrypt_datagram(&datagram).unwrap();
        assert!(!b.is_idle(Duration::from_secs(60)));
    }
}
