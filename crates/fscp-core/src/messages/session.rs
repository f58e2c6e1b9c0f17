//! SESSION_REQUEST and SESSION bodies.
//!
//! Both carry a detached RSASSA-PSS signature over every byte that precedes
//! the signature length field. A request is signed with SHA-256 (no suite is
//! agreed yet); a session message is signed with the chosen suite's hash.

use super::Reader;
use crate::error::MessageError;
use crate::identifier::HostIdentifier;
use fscp_crypto::{
    sign_pss, verify_pss, CipherSuite, CryptoError, EllipticCurve, RsaPrivateKey, RsaPublicKey,
    SignatureHash,
};

/// Body of a session request: a signed proposal of capabilities.
#[derive(Debug, Clone)]
pub struct SessionRequestMessage {
    /// Proposed session number, strictly greater than any prior proposal
    pub session_number: u32,
    /// The sender's host identifier
    pub host_identifier: HostIdentifier,
    /// Cipher suite capability codes in sender preference order
    pub cipher_suites: Vec<u8>,
    /// Elliptic curve capability codes in sender preference order
    pub elliptic_curves: Vec<u8>,
    signature: Vec<u8>,
    signed: Vec<u8>,
}

impl SessionRequestMessage {
    /// Build and sign a session request body.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SigningFailed` if signing fails.
    pub fn write(
        session_number: u32,
        host_identifier: HostIdentifier,
        cipher_suites: &[CipherSuite],
        elliptic_curves: &[EllipticCurve],
        signing_key: &RsaPrivateKey,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut signed = Vec::with_capacity(
            4 + 32 + 2 + cipher_suites.len() + 2 + elliptic_curves.len(),
        );
        signed.extend_from_slice(&session_number.to_be_bytes());
        signed.extend_from_slice(host_identifier.as_bytes());
        signed.extend_from_slice(&(cipher_suites.len() as u16).to_be_bytes());
        signed.extend(cipher_suites.iter().map(|cs| cs.code()));
        signed.extend_from_slice(&(elliptic_curves.len() as u16).to_be_bytes());
        signed.extend(elliptic_curves.iter().map(|ec| ec.code()));

        let signature = sign_pss(signing_key, SignatureHash::Sha256, &signed)?;

        let mut body = signed;
        body.extend_from_slice(&(signature.len() as u16).to_be_bytes());
        body.extend_from_slice(&signature);
        Ok(body)
    }

    /// Parse a session request body.
    ///
    /// Unknown capability codes are retained verbatim; use
    /// [`Self::known_cipher_suites`] / [`Self::known_elliptic_curves`] to get
    /// the locally understood subsets.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::BadLayout` on any layout violation.
    pub fn parse(body: &[u8]) -> Result<Self, MessageError> {
        let mut r = Reader::new(body, "session_request");

        let session_number = r.u32()?;
        let host_identifier = HostIdentifier::from_bytes(r.array_32()?);
        let cs_count = r.u16()? as usize;
        let cipher_suites = r.take(cs_count)?.to_vec();
        let ec_count = r.u16()? as usize;
        let elliptic_curves = r.take(ec_count)?.to_vec();

        let signed = body[..r.consumed()].to_vec();

        let sig_len = r.u16()? as usize;
        if sig_len == 0 {
            return Err(r.error());
        }
        let signature = r.take(sig_len)?.to_vec();
        r.finish()?;

        Ok(Self {
            session_number,
            host_identifier,
            cipher_suites,
            elliptic_curves,
            signature,
            signed,
        })
    }

    /// Verify the signature against the peer's signing key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::BadSignature` on mismatch.
    pub fn verify(&self, public_key: &RsaPublicKey) -> Result<(), CryptoError> {
        verify_pss(public_key, SignatureHash::Sha256, &self.signed, &self.signature)
    }

    /// Capability codes we understand, preserving the sender's order
    #[must_use]
    pub fn known_cipher_suites(&self) -> Vec<CipherSuite> {
        self.cipher_suites
            .iter()
            .filter_map(|&code| CipherSuite::try_from(code).ok())
            .collect()
    }

    /// Curve codes we understand, preserving the sender's order
    #[must_use]
    pub fn known_elliptic_curves(&self) -> Vec<EllipticCurve> {
        self.elliptic_curves
            .iter()
            .filter_map(|&code| EllipticCurve::try_from(code).ok())
            .collect()
    }
}

/// Body of a session message: the accepted parameters plus an ephemeral key.
#[derive(Debug, Clone)]
pub struct SessionMessage {
    /// The session number being agreed
    pub session_number: u32,
    /// The sender's host identifier
    pub host_identifier: HostIdentifier,
    /// Chosen cipher suite code
    pub cipher_suite: u8,
    /// Chosen elliptic curve code
    pub elliptic_curve: u8,
    /// SEC1-encoded ephemeral public key
    pub public_key: Vec<u8>,
    signature: Vec<u8>,
    signed: Vec<u8>,
}

impl SessionMessage {
    /// Build and sign a session body with the suite's hash.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SigningFailed` if signing fails.
    pub fn write(
        session_number: u32,
        host_identifier: HostIdentifier,
        suite: CipherSuite,
        curve: EllipticCurve,
        public_key: &[u8],
        signing_key: &RsaPrivateKey,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut signed = Vec::with_capacity(4 + 32 + 2 + 2 + public_key.len());
        signed.extend_from_slice(&session_number.to_be_bytes());
        signed.extend_from_slice(host_identifier.as_bytes());
        signed.push(suite.code());
        signed.push(curve.code());
        signed.extend_from_slice(&(public_key.len() as u16).to_be_bytes());
        signed.extend_from_slice(public_key);

        let signature = sign_pss(signing_key, SignatureHash::from(suite), &signed)?;

        let mut body = signed;
        body.extend_from_slice(&(signature.len() as u16).to_be_bytes());
        body.extend_from_slice(&signature);
        Ok(body)
    }

    /// Parse a session body.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::BadLayout` on any layout violation.
    pub fn parse(body: &[u8]) -> Result<Self, MessageError> {
        let mut r = Reader::new(body, "session");

        let session_number = r.u32()?;
        let host_identifier = HostIdentifier::from_bytes(r.array_32()?);
        let cipher_suite = r.u8()?;
        let elliptic_curve = r.u8()?;
        let key_len = r.u16()? as usize;
        if key_len == 0 {
            return Err(r.error());
        }
        let public_key = r.take(key_len)?.to_vec();

        let signed = body[..r.consumed()].to_vec();

        let sig_len = r.u16()? as usize;
        if sig_len == 0 {
            return Err(r.error());
        }
        let signature = r.take(sig_len)?.to_vec();
        r.finish()?;

        Ok(Self {
            session_number,
            host_identifier,
            cipher_suite,
            elliptic_curve,
            public_key,
            signature,
            signed,
        })
    }

    /// The chosen suite, decoded.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::UnknownCipherSuite` for unknown codes.
    pub fn suite(&self) -> Result<CipherSuite, MessageError> {
        CipherSuite::try_from(self.cipher_suite)
            .map_err(|_| MessageError::UnknownCipherSuite(self.cipher_suite))
    }

    /// The chosen curve, decoded.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::UnknownEllipticCurve` for unknown codes.
    pub fn curve(&self) -> Result<EllipticCurve, MessageError> {
        EllipticCurve::try_from(self.elliptic_curve)
            .map_err(|_| MessageError::UnknownEllipticCurve(self.elliptic_curve))
    }

    /// Verify the signature against the peer's signing key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::BadSignature` on mismatch, or
    /// `CryptoError::UnsupportedCipherSuite` if the suite code (and so the
    /// hash) is unknown.
    pub fn verify(&self, public_key: &RsaPublicKey) -> Result<(), CryptoError> {
        let suite = CipherSuite::try_from(self.cipher_suite)?;
        verify_pss(
            public_key,
            SignatureHash::from(suite),
            &self.signed,
            &self.signature,
        )
    }
}
