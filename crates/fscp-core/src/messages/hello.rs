//! HELLO_REQUEST / HELLO_RESPONSE bodies.

use super::Reader;
use crate::error::MessageError;

/// Body of a hello request or response: one 32-bit unique number.
///
/// A response echoes the request's number verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloMessage {
    /// The unique request identifier
    pub unique_number: u32,
}

impl HelloMessage {
    /// Parse a hello body.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::BadLayout` unless the body is exactly 4 bytes.
    pub fn parse(body: &[u8]) -> Result<Self, MessageError> {
        let mut r = Reader::new(body, "hello");
        let unique_number = r.u32()?;
        r.finish()?;
        Ok(Self { unique_number })
    }

    /// Serialize the body
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        self.unique_number.to_be_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let msg = HelloMessage {
            unique_number: 0xDEAD_BEEF,
        };
        assert_eq!(HelloMessage::parse(&msg.to_bytes()).unwrap(), msg);
    }

    #[test]
    fn test_wrong_sizes_rejected() {
        assert!(HelloMessage::parse(&[]).is_err());
        assert!(HelloMessage::parse(&[0; 3]).is_err());
        assert!(HelloMessage::parse(&[0; 5]).is_err());
    }
}
