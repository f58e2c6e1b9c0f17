//! Contact sub-protocol payloads.
//!
//! These are plaintexts carried on the reserved data channels (contact on
//! channel 1, contact-request on channel 2), so they inherit the session's
//! confidentiality and authentication. Fingerprints are SHA-256 over the
//! DER-encoded signing certificate.

use super::Reader;
use crate::endpoint::Endpoint;
use crate::error::MessageError;
use fscp_crypto::Fingerprint;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

const ADDR_TYPE_V4: u8 = 0x01;
const ADDR_TYPE_V6: u8 = 0x02;

/// A request for endpoint hints: the fingerprints the sender wants to reach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRequestPayload {
    /// Signing-certificate fingerprints of the wanted peers
    pub fingerprints: Vec<Fingerprint>,
}

impl ContactRequestPayload {
    /// Parse a contact-request plaintext.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::BadLayout` on count/body disagreement.
    pub fn parse(body: &[u8]) -> Result<Self, MessageError> {
        let mut r = Reader::new(body, "contact_request");
        let count = r.u16()? as usize;
        let mut fingerprints = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            fingerprints.push(r.array_32()?);
        }
        r.finish()?;
        Ok(Self { fingerprints })
    }

    /// Serialize the plaintext
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 32 * self.fingerprints.len());
        out.extend_from_slice(&(self.fingerprints.len() as u16).to_be_bytes());
        for fp in &self.fingerprints {
            out.extend_from_slice(fp);
        }
        out
    }
}

/// One endpoint hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEntry {
    /// Signing-certificate fingerprint of the hinted peer
    pub fingerprint: Fingerprint,
    /// Where that peer was last reachable
    pub endpoint: Endpoint,
}

/// The answer to a contact request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactPayload {
    /// Endpoint hints for currently connected, shareable peers
    pub entries: Vec<ContactEntry>,
}

impl ContactPayload {
    /// Parse a contact plaintext.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::BadLayout` on count/body disagreement or an
    /// unknown address type.
    pub fn parse(body: &[u8]) -> Result<Self, MessageError> {
        let mut r = Reader::new(body, "contact");
        let count = r.u16()? as usize;
        let mut entries = Vec::with_capacity(count.min(256));

        for _ in 0..count {
            let fingerprint = r.array_32()?;
            let addr = match r.u8()? {
                ADDR_TYPE_V4 => {
                    let octets = r.take(4)?;
                    IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
                }
                ADDR_TYPE_V6 => {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(r.take(16)?);
                    IpAddr::V6(Ipv6Addr::from(octets))
                }
                _ => return Err(r.error()),
            };
            let port = r.u16()?;
            entries.push(ContactEntry {
                fingerprint,
                endpoint: Endpoint::new(SocketAddr::new(addr, port)),
            });
        }

        r.finish()?;
        Ok(Self { entries })
    }

    /// Serialize the plaintext
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 51 * self.entries.len());
        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());

        for entry in &self.entries {
            out.extend_from_slice(&entry.fingerprint);
            match entry.endpoint.ip() {
                IpAddr::V4(v4) => {
                    out.push(ADDR_TYPE_V4);
                    out.extend_from_slice(&v4.octets());
                }
                IpAddr::V6(v6) => {
                    out.push(ADDR_TYPE_V6);
                    out.extend_from_slice(&v6.octets());
                }
            }
            out.extend_from_slice(&entry.endpoint.port().to_be_bytes());
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_request_roundtrip() {
        let payload = ContactRequestPayload {
            fingerprints: vec![[1u8; 32], [2u8; 32]],
        };
        assert_eq!(
            ContactRequestPayload::parse(&payload.to_bytes()).unwrap(),
            payload
        );
    }

    #[test]
    fn test_contact_request_empty() {
        let payload = ContactRequestPayload {
            fingerprints: vec![],
        };
        assert_eq!(
            ContactRequestPayload::parse(&payload.to_bytes()).unwrap(),
            payload
        );
    }

    #[test]
    fn test_contact_roundtrip_mixed_families() {
        let payload = ContactPayload {
            entries: vec![
                ContactEntry {
                    fingerprint: [7u8; 32],
                    endpoint: "192.0.2.10:12000".parse().unwrap(),
                },
                ContactEntry {
                    fingerprint: [8u8; 32],
                    endpoint: "[2001:db8::5]:12001".parse().unwrap(),
                },
            ],
        };
        assert_eq!(ContactPayload::parse(&payload.to_bytes()).unwrap(), payload);
    }

    #[test]
    fn test_contact_bad_address_type() {
        let mut bytes = ContactPayload {
            entries: vec![ContactEntry {
                fingerprint: [0u8; 32],
                endpoint: "192.0.2.1:1".parse().unwrap(),
            }],
        }
        .to_bytes();
        bytes[2 + 32] = 0x03;
        assert!(ContactPayload::parse(&bytes).is_err());
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let mut bytes = ContactRequestPayload {
            fingerprints: vec![[1u8; 32]],
        }
        .to_bytes();
        bytes[1] = 2; // claims two fingerprints
        assert!(ContactRequestPayload::parse(&bytes).is_err());
    }
}
