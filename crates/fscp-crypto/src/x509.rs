//! X.509 certificate handling: parsing, trust validation, identity storage.
//!
//! Certificates are carried on the wire as DER. All the fields the engine
//! needs (names, validity window, key usage, RSA public key, fingerprint) are
//! extracted once at construction so the rest of the code never touches ASN.1.

use crate::constant_time::ct_eq;
use crate::signature::SignatureHash;
use crate::CryptoError;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, VerifyingKey as Pkcs1v15VerifyingKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::Verifier;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use x509_parser::oid_registry;
use x509_parser::prelude::*;

/// SHA-256 fingerprint of a DER-encoded certificate
pub type Fingerprint = [u8; 32];

/// Key-usage bits relevant to the protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyUsageBits {
    /// `digitalSignature`
    pub digital_signature: bool,
    /// `keyEncipherment`
    pub key_encipherment: bool,
    /// `keyAgreement`
    pub key_agreement: bool,
    /// Whether the extension was present at all
    pub present: bool,
}

/// A parsed X.509 certificate with its DER form retained
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    fingerprint: Fingerprint,
    subject: String,
    issuer: String,
    subject_der: Vec<u8>,
    issuer_der: Vec<u8>,
    not_before: i64,
    not_after: i64,
    public_key: RsaPublicKey,
    key_usage: KeyUsageBits,
    tbs: Vec<u8>,
    signature: Vec<u8>,
    signature_hash: SignatureHash,
    self_signed: bool,
}

impl Certificate {
    /// Parse a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MalformedCertificate` if the DER does not parse
    /// or uses an unsupported signature algorithm, and
    /// `CryptoError::NotAnRsaKey` if the subject public key is not RSA.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let (rem, cert) = X509Certificate::from_der(der)
            .map_err(|e| CryptoError::MalformedCertificate(e.to_string()))?;
        if !rem.is_empty() {
            return Err(CryptoError::MalformedCertificate(
                "trailing bytes after certificate".into(),
            ));
        }

        let spki = cert.public_key();
        if spki.algorithm.algorithm != oid_registry::OID_PKCS1_RSAENCRYPTION {
            return Err(CryptoError::NotAnRsaKey);
        }
        let public_key = RsaPublicKey::from_pkcs1_der(&spki.subject_public_key.data)
            .map_err(|e| CryptoError::MalformedCertificate(e.to_string()))?;

        let sig_oid = &cert.signature_algorithm.algorithm;
        let signature_hash = if *sig_oid == oid_registry::OID_PKCS1_SHA256WITHRSA {
            SignatureHash::Sha256
        } else if *sig_oid == oid_registry::OID_PKCS1_SHA384WITHRSA {
            SignatureHash::Sha384
        } else {
            return Err(CryptoError::MalformedCertificate(format!(
                "unsupported signature algorithm {sig_oid}"
            )));
        };

        let key_usage = match cert.key_usage() {
            Ok(Some(ext)) => KeyUsageBits {
                digital_signature: ext.value.digital_signature(),
                key_encipherment: ext.value.key_encipherment(),
                key_agreement: ext.value.key_agreement(),
                present: true,
            },
            Ok(None) => KeyUsageBits::default(),
            Err(e) => return Err(CryptoError::MalformedCertificate(e.to_string())),
        };

        let fingerprint: Fingerprint = Sha256::digest(der).into();

        Ok(Self {
            fingerprint,
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            subject_der: cert.subject().as_raw().to_vec(),
            issuer_der: cert.issuer().as_raw().to_vec(),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            public_key,
            key_usage,
            tbs: cert.tbs_certificate.as_ref().to_vec(),
            signature: cert.signature_value.data.to_vec(),
            signature_hash,
            self_signed: cert.subject() == cert.issuer(),
            der: der.to_vec(),
        })
    }

    /// Parse the first CERTIFICATE block of a PEM buffer.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MalformedCertificate` if no certificate block is
    /// found or the contained DER is invalid.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CryptoError> {
        for entry in Pem::iter_from_buffer(pem) {
            let entry = entry.map_err(|e| CryptoError::MalformedCertificate(e.to_string()))?;
            if entry.label == "CERTIFICATE" {
                return Self::from_der(&entry.contents);
            }
        }
        Err(CryptoError::MalformedCertificate(
            "no CERTIFICATE block in PEM input".into(),
        ))
    }

    /// The DER encoding
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-256 fingerprint of the DER encoding
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Subject distinguished name
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// RSA public key from the SubjectPublicKeyInfo
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Key-usage extension bits
    #[must_use]
    pub fn key_usage(&self) -> KeyUsageBits {
        self.key_usage
    }

    /// Whether subject and issuer are the same name
    #[must_use]
    pub fn is_self_signed(&self) -> bool {
        self.self_signed
    }

    /// Whether `at` falls within the validity window
    #[must_use]
    pub fn is_valid_at(&self, at: SystemTime) -> bool {
        match at.duration_since(UNIX_EPOCH) {
            Ok(d) => {
                let now = d.as_secs() as i64;
                now >= self.not_before && now <= self.not_after
            }
            Err(_) => false,
        }
    }

    /// Whether the certificate is currently within its validity window
    #[must_use]
    pub fn is_currently_valid(&self) -> bool {
        self.is_valid_at(SystemTime::now())
    }

    /// Whether the two certificates share subject and issuer names.
    ///
    /// Required between a peer's signing and encryption certificates.
    #[must_use]
    pub fn same_names_as(&self, other: &Certificate) -> bool {
        self.subject_der == other.subject_der && self.issuer_der == other.issuer_der
    }

    /// Whether `issuer` plausibly issued this certificate (name chaining)
    #[must_use]
    pub fn chains_to(&self, issuer: &Certificate) -> bool {
        self.issuer_der == issuer.subject_der
    }

    /// Verify the certificate signature against `issuer`'s public key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::BadSignature` if the signature does not verify.
    pub fn verify_signed_by(&self, issuer: &Certificate) -> Result<(), CryptoError> {
        let signature = Pkcs1v15Signature::try_from(self.signature.as_slice())
            .map_err(|_| CryptoError::BadSignature)?;

        let verified = match self.signature_hash {
            SignatureHash::Sha256 => {
                Pkcs1v15VerifyingKey::<Sha256>::new(issuer.public_key.clone())
                    .verify(&self.tbs, &signature)
            }
            SignatureHash::Sha384 => {
                Pkcs1v15VerifyingKey::<Sha384>::new(issuer.public_key.clone())
                    .verify(&self.tbs, &signature)
            }
        };

        verified.map_err(|_| CryptoError::BadSignature)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("fingerprint", &hex::encode(&self.fingerprint[..8]))
            .finish_non_exhaustive()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        ct_eq(&self.der, &other.der)
    }
}

impl Eq for Certificate {}

/// The set of certificates trusted a priori.
///
/// A remote certificate is accepted iff it byte-matches an anchor (pinning)
/// or its signature chain terminates at an anchor.
#[derive(Clone, Default)]
pub struct TrustStore {
    anchors: Vec<Certificate>,
}

impl TrustStore {
    /// Create an empty store (accepts nothing)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trust anchor
    pub fn add_anchor(&mut self, anchor: Certificate) {
        self.anchors.push(anchor);
    }

    /// Number of anchors
    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether the store holds no anchors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Whether `cert` is trusted: pinned byte-for-byte, or signed by a
    /// currently valid anchor it names as issuer.
    #[must_use]
    pub fn verifies(&self, cert: &Certificate) -> bool {
        for anchor in &self.anchors {
            if ct_eq(anchor.der(), cert.der()) {
                return true;
            }
            if cert.chains_to(anchor)
                && anchor.is_currently_valid()
                && cert.verify_signed_by(anchor).is_ok()
            {
                return true;
            }
        }
        false
    }
}

/// The local node's certificates and private keys.
///
/// If no distinct encryption pair is supplied, the signing pair serves both
/// roles. Both certificates must share subject and issuer names.
#[derive(Clone)]
pub struct IdentityStore {
    signing_certificate: Certificate,
    signing_key: RsaPrivateKey,
    encryption_certificate: Option<Certificate>,
    encryption_key: Option<RsaPrivateKey>,
}

impl IdentityStore {
    /// Build an identity from a signing pair and an optional encryption pair.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MalformedCertificate` if the encryption
    /// certificate does not share the signing certificate's names.
    pub fn new(
        signing_certificate: Certificate,
        signing_key: RsaPrivateKey,
        encryption: Option<(Certificate, RsaPrivateKey)>,
    ) -> Result<Self, CryptoError> {
        let (encryption_certificate, encryption_key) = match encryption {
            Some((cert, key)) => {
                if !cert.same_names_as(&signing_certificate) {
                    return Err(CryptoError::MalformedCertificate(
                        "signature and encryption certificates must share subject and issuer"
                            .into(),
                    ));
                }
                (Some(cert), Some(key))
            }
            None => (None, None),
        };

        Ok(Self {
            signing_certificate,
            signing_key,
            encryption_certificate,
            encryption_key,
        })
    }

    /// The signing certificate
    #[must_use]
    pub fn signing_certificate(&self) -> &Certificate {
        &self.signing_certificate
    }

    /// The signing private key
    #[must_use]
    pub fn signing_key(&self) -> &RsaPrivateKey {
        &self.signing_key
    }

    /// The encryption certificate, if distinct from the signing one
    #[must_use]
    pub fn encryption_certificate(&self) -> Option<&Certificate> {
        self.encryption_certificate.as_ref()
    }

    /// The certificate peers should encrypt to (falls back to signing)
    #[must_use]
    pub fn effective_encryption_certificate(&self) -> &Certificate {
        self.encryption_certificate
            .as_ref()
            .unwrap_or(&self.signing_certificate)
    }

    /// The private key matching `effective_encryption_certificate`
    #[must_use]
    pub fn effective_encryption_key(&self) -> &RsaPrivateKey {
        self.encryption_key.as_ref().unwrap_or(&self.signing_key)
    }

    /// Fingerprint of the signing certificate (the node's contact identity)
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.signing_certificate.fingerprint()
    }
}

impl fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityStore")
            .field("subject", &self.signing_certificate.subject())
            .field(
                "distinct_encryption_certificate",
                &self.encryption_certificate.is_some(),
            )
            .finish()
    }
}

/// Load an RSA private key from PEM (PKCS#8 or PKCS#1).
///
/// # Errors
///
/// Returns `CryptoError::MalformedKey` if neither encoding parses.
pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    use rsa::pkcs1::DecodeRsaPrivateKey;

    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::MalformedKey(e.to_string()))
}
