//! Ephemeral elliptic-curve Diffie-Hellman key agreement.
//!
//! One ephemeral key pair is generated per session negotiation on the curve
//! agreed during the handshake and discarded once the schedule is derived.

use crate::{CryptoError, EllipticCurve};
use rand_core::OsRng;
use zeroize::Zeroizing;

enum Inner {
    P384(p384::ecdh::EphemeralSecret),
    P521(p521::ecdh::EphemeralSecret),
}

/// An ephemeral key pair bound to a negotiated curve
pub struct EphemeralKeyPair {
    curve: EllipticCurve,
    inner: Inner,
}

impl EphemeralKeyPair {
    /// Generate a fresh key pair on `curve`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::UnsupportedEllipticCurve` for curves without a
    /// key-agreement backend (`sect571k1`).
    pub fn generate(curve: EllipticCurve) -> Result<Self, CryptoError> {
        let inner = match curve {
            EllipticCurve::Secp384r1 => Inner::P384(p384::ecdh::EphemeralSecret::random(&mut OsRng)),
            EllipticCurve::Secp521r1 => Inner::P521(p521::ecdh::EphemeralSecret::random(&mut OsRng)),
            EllipticCurve::Sect571k1 => {
                return Err(CryptoError::UnsupportedEllipticCurve(curve.code()))
            }
        };

        Ok(Self { curve, inner })
    }

    /// The curve this key pair lives on
    #[must_use]
    pub fn curve(&self) -> EllipticCurve {
        self.curve
    }

    /// SEC1 uncompressed encoding of the public key
    #[must_use]
    pub fn public_key_bytes(&self) -> Vec<u8> {
        use p384::elliptic_curve::sec1::ToEncodedPoint;

        match &self.inner {
            Inner::P384(secret) => secret
                .public_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
            Inner::P521(secret) => secret
                .public_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
        }
    }

    /// Compute the shared secret against a peer's SEC1-encoded public key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::AgreementFailed` if the peer key is not a valid
    /// point on this key pair's curve.
    pub fn agree(&self, peer_public: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        match &self.inner {
            Inner::P384(secret) => {
                let peer = p384::PublicKey::from_sec1_bytes(peer_public)
                    .map_err(|_| CryptoError::AgreementFailed)?;
                let shared = secret.diffie_hellman(&peer);
                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
            Inner::P521(secret) => {
                let peer = p521::PublicKey::from_sec1_bytes(peer_public)
                    .map_err(|_| CryptoError::AgreementFailed)?;
                let shared = secret.diffie_hellman(&peer);
                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
        }
    }
}
