//! PRESENTATION body: the sender's DER-encoded certificates.

use super::Reader;
use crate::error::MessageError;

/// Body of a presentation message.
///
/// Carries the signing certificate and, when the sender uses a distinct key
/// pair for encryption, the encryption certificate. A zero-length second
/// field means the signing certificate serves both roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationMessage {
    /// DER-encoded signing certificate
    pub signature_certificate: Vec<u8>,
    /// DER-encoded encryption certificate, if distinct
    pub encryption_certificate: Option<Vec<u8>>,
}

impl PresentationMessage {
    /// Parse a presentation body.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::BadLayout` on truncated length prefixes, an
    /// empty signing certificate or trailing bytes.
    pub fn parse(body: &[u8]) -> Result<Self, MessageError> {
        let mut r = Reader::new(body, "presentation");

        let sig_len = r.u16()? as usize;
        if sig_len == 0 {
            return Err(r.error());
        }
        let signature_certificate = r.take(sig_len)?.to_vec();

        let enc_len = r.u16()? as usize;
        let encryption_certificate = if enc_len == 0 {
            None
        } else {
            Some(r.take(enc_len)?.to_vec())
        };

        r.finish()?;

        Ok(Self {
            signature_certificate,
            encryption_certificate,
        })
    }

    /// Serialize the body
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let enc = self.encryption_certificate.as_deref().unwrap_or(&[]);
        let mut out =
            Vec::with_capacity(4 + self.signature_certificate.len() + enc.len());
        out.extend_from_slice(&(self.signature_certificate.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.signature_certificate);
        out.extend_from_slice(&(enc.len() as u16).to_be_bytes());
        out.extend_from_slice(enc);
        out
    }
}
