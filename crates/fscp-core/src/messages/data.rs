//! DATA_n body layout and AEAD framing helpers.
//!
//! A data body is `sequence_number(4) | ciphertext | tag(16)`. The nonce is
//! `nonce_prefix(7) | channel(1) | sequence_number(4)`; the associated data
//! is the 4-byte header followed by the channel number byte, so a datagram
//! cannot be replayed on another channel or with a forged length.

use crate::error::MessageError;
use crate::message::{header_bytes, MessageType};
use crate::HEADER_SIZE;
use fscp_crypto::kdf::NONCE_PREFIX_LEN;
use fscp_crypto::{AUTH_TAG_SIZE, NONCE_SIZE};

/// Parsed view of a data body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBody<'a> {
    /// The sequence number
    pub sequence_number: u32,
    /// Ciphertext with the trailing authentication tag
    pub ciphertext: &'a [u8],
}

/// Parse a data body.
///
/// # Errors
///
/// Returns `MessageError::BadLayout` if the body cannot hold a sequence
/// number and a tag.
pub fn parse_data_body(body: &[u8]) -> Result<DataBody<'_>, MessageError> {
    if body.len() < 4 + AUTH_TAG_SIZE {
        return Err(MessageError::BadLayout("data"));
    }

    Ok(DataBody {
        sequence_number: u32::from_be_bytes([body[0], body[1], body[2], body[3]]),
        ciphertext: &body[4..],
    })
}

/// Assemble a full data datagram from an already encrypted payload
#[must_use]
pub fn build_data_datagram(channel: u8, sequence_number: u32, ciphertext: &[u8]) -> Vec<u8> {
    let body_len = 4 + ciphertext.len();
    let mut out = Vec::with_capacity(HEADER_SIZE + body_len);
    out.extend_from_slice(&header_bytes(MessageType::Data(channel), body_len));
    out.extend_from_slice(&sequence_number.to_be_bytes());
    out.extend_from_slice(ciphertext);
    out
}

/// Associated data for a data message whose plaintext is `plaintext_len`
/// bytes: the header it will be framed with, plus the channel byte.
#[must_use]
pub fn data_aad(channel: u8, plaintext_len: usize) -> [u8; 5] {
    let body_len = 4 + plaintext_len + AUTH_TAG_SIZE;
    let header = header_bytes(MessageType::Data(channel), body_len);
    [header[0], header[1], header[2], header[3], channel]
}

/// The 96-bit nonce for one data message
#[must_use]
pub fn data_nonce(
    prefix: &[u8; NONCE_PREFIX_LEN],
    channel: u8,
    sequence_number: u32,
) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_LEN] = channel;
    nonce[NONCE_PREFIX_LEN + 1..].copy_from_slice(&sequence_number.to_be_bytes());
    nonce
}
