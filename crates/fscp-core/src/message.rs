//! Message framing for the FSCP wire protocol.
//!
//! Every datagram carries a 4-byte header, `version(1) | type(1) |
//! length(2)`, followed by `length` body bytes. All multi-byte integers are
//! big-endian. Parsing is zero-copy; the typed body codecs live in
//! [`crate::messages`].

use crate::error::MessageError;
use crate::{CHANNEL_COUNT, HEADER_SIZE, PROTOCOL_VERSION};

/// Message types as carried in the header type byte.
///
/// Data messages occupy `0x70..=0x7F`; the low nibble is the channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Reachability probe carrying a unique number
    HelloRequest,
    /// Echo of a hello request's unique number
    HelloResponse,
    /// Certificate exchange
    Presentation,
    /// Signed session proposal
    SessionRequest,
    /// Signed session parameters with an ephemeral public key
    Session,
    /// Authenticated-encrypted data on one of 16 channels
    Data(u8),
}

impl MessageType {
    /// Wire code of this type
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            MessageType::HelloRequest => 0x00,
            MessageType::HelloResponse => 0x01,
            MessageType::Presentation => 0x02,
            MessageType::SessionRequest => 0x03,
            MessageType::Session => 0x04,
            MessageType::Data(channel) => 0x70 | (channel & 0x0F),
        }
    }

    /// The channel number, for data messages
    #[must_use]
    pub fn channel(self) -> Option<u8> {
        match self {
            MessageType::Data(channel) => Some(channel),
            _ => None,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MessageType::HelloRequest),
            0x01 => Ok(MessageType::HelloResponse),
            0x02 => Ok(MessageType::Presentation),
            0x03 => Ok(MessageType::SessionRequest),
            0x04 => Ok(MessageType::Session),
            0x70..=0x7F => Ok(MessageType::Data(value & 0x0F)),
            other => Err(MessageError::UnknownType(other)),
        }
    }
}

/// Zero-copy view of one parsed datagram
#[derive(Debug)]
pub struct Message<'a> {
    message_type: MessageType,
    body: &'a [u8],
}

impl<'a> Message<'a> {
    /// Parse a datagram.
    ///
    /// Trailing bytes beyond the declared length are ignored.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::TooShort` for truncated headers,
    /// `MessageError::UnknownVersion` / `UnknownType` for bad header fields
    /// and `MessageError::LengthOverflow` if the declared length exceeds the
    /// datagram.
    pub fn parse(data: &'a [u8]) -> Result<Self, MessageError> {
        if data.len() < HEADER_SIZE {
            return Err(MessageError::TooShort {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        if data[0] != PROTOCOL_VERSION {
            return Err(MessageError::UnknownVersion(data[0]));
        }

        let message_type = MessageType::try_from(data[1])?;
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        let remaining = data.len() - HEADER_SIZE;

        if length > remaining {
            return Err(MessageError::LengthOverflow {
                declared: length,
                remaining,
            });
        }

        Ok(Self {
            message_type,
            body: &data[HEADER_SIZE..HEADER_SIZE + length],
        })
    }

    /// The message type
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The body bytes (zero-copy)
    #[must_use]
    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    /// The 4-byte header these fields serialize to
    #[must_use]
    pub fn header_bytes(&self) -> [u8; 4] {
        header_bytes(self.message_type, self.body.len())
    }
}

/// Serialize the header for a body of `body_len` bytes
#[must_use]
pub fn header_bytes(message_type: MessageType, body_len: usize) -> [u8; 4] {
    debug_assert!(body_len <= u16::MAX as usize);
    let len = (body_len as u16).to_be_bytes();
    [PROTOCOL_VERSION, message_type.code(), len[0], len[1]]
}

/// Build a full datagram from a type and body
#[must_use]
pub fn write_message(message_type: MessageType, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(&header_bytes(message_type, body.len()));
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_all_types() {
        let types = [
            MessageType::HelloRequest,
            MessageType::HelloResponse,
            MessageType::Presentation,
            MessageType::SessionRequest,
            MessageType::Session,
        ];
        for t in types {
            let datagram = write_message(t, b"body");
            let parsed = Message::parse(&datagram).unwrap();
            assert_eq!(parsed.message_type(), t);
            assert_eq!(parsed.body(), b"body");
        }
    }

    #[test]
    fn test_data_channels() {
        for channel in 0..CHANNEL_COUNT as u8 {
            let datagram = write_message(MessageType::Data(channel), &[0xAB; 10]);
            assert_eq!(datagram[1], 0x70 | channel);
            let parsed = Message::parse(&datagram).unwrap();
            assert_eq!(parsed.message_type(), MessageType::Data(channel));
            assert_eq!(parsed.message_type().channel(), Some(channel));
        }
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            Message::parse(&[PROTOCOL_VERSION, 0x00, 0x00]),
            Err(MessageError::TooShort { .. })
        ));
    }

    #[test]
    fn test_unknown_version() {
        let mut datagram = write_message(MessageType::HelloRequest, &[0; 4]);
        datagram[0] = 0x02;
        assert!(matches!(
            Message::parse(&datagram),
            Err(MessageError::UnknownVersion(0x02))
        ));
    }

    #[test]
    fn test_unknown_type() {
        let mut datagram = write_message(MessageType::HelloRequest, &[0; 4]);
        datagram[1] = 0x42;
        assert!(matches!(
            Message::parse(&datagram),
            Err(MessageError::UnknownType(0x42))
        ));
    }

    #[test]
    fn test_length_overflow() {
        let mut datagram = write_message(MessageType::Presentation, b"abc");
        datagram[3] = 0xFF;
        assert!(matches!(
            Message::parse(&datagram),
            Err(MessageError::LengthOverflow { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut datagram = write_message(MessageType::HelloRequest, &[1, 2, 3, 4]);
        datagram.extend_from_slice(&[9, 9, 9]);
        let parsed = Message::parse(&datagram).unwrap();
        assert_eq!(parsed.body(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_header_bytes_match() {
        let datagram = write_message(MessageType::Data(3), &[0; 21]);
        let parsed = Message::parse(&datagram).unwrap();
        assert_eq!(parsed.header_bytes(), [PROTOCOL_VERSION, 0x73, 0x00, 21]);
        assert_eq!(&datagram[..4], &parsed.header_bytes());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..2048)) {
                let _ = Message::parse(&data);
            }

            #[test]
            fn prop_write_parse_identity(
                type_code in prop::sample::select(vec![0x00u8, 0x01, 0x02, 0x03, 0x04, 0x70, 0x75, 0x7F]),
                body in prop::collection::vec(any::<u8>(), 0..1024),
            ) {
                let t = MessageType::try_from(type_code).unwrap();
                let datagram = write_message(t, &body);
                let parsed = Message::parse(&datagram).unwrap();
                prop_assert_eq!(parsed.message_type(), t);
                prop_assert_eq!(parsed.body(), body.as_slice());
            }
        }
    }
}
