//! NetBIOS over TCP (NBT) session service
//!
//! RFC 1001/1002 session framing: a 4-byte header carrying a message type
//! and a 17-bit payload length. Port 445 uses the same framing without the
//! session request handshake.

pub mod name;

use crate::error::{Error, Result};
use crate::protocol::NetBiosMessageType;
use std::convert::TryFrom;

/// NetBIOS Session Service header (4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetBiosHeader {
    pub message_type: NetBiosMessageType,
    /// Payload length, 17 bits max
    pub length: u32,
}

impl NetBiosHeader {
    /// Maximum payload length (17 bits)
    pub const MAX_LENGTH: u32 = 0x1FFFF;

    /// Header size in bytes
    pub const SIZE: usize = 4;

    pub fn new(message_type: NetBiosMessageType, length: u32) -> Result<Self> {
        if length > Self::MAX_LENGTH {
            return Err(Error::InvalidParameter(format!(
                "NetBIOS length {} exceeds maximum {}",
                length,
                Self::MAX_LENGTH
            )));
        }
        Ok(Self {
            message_type,
            length,
        })
    }

    pub fn session_message(length: u32) -> Result<Self> {
        Self::new(NetBiosMessageType::SessionMessage, length)
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                need: Self::SIZE,
                have: buf.len(),
            });
        }

        let message_type = NetBiosMessageType::try_from(buf[0])?;
        // Length lives in the lower 17 bits of bytes 1-3
        let length = (((buf[1] & 0x01) as u32) << 16) | ((buf[2] as u32) << 8) | (buf[3] as u32);

        Ok(Self {
            message_type,
            length,
        })
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [
            self.message_type as u8,
            ((self.length >> 16) & 0x01) as u8,
            ((self.length >> 8) & 0xFF) as u8,
            (self.length & 0xFF) as u8,
        ]
    }
}

/// NetBIOS session message wrapper
pub struct NetBiosMessage {
    pub header: NetBiosHeader,
    pub payload: Vec<u8>,
}

impl NetBiosMessage {
    pub fn session_message(payload: Vec<u8>) -> Result<Self> {
        let header = NetBiosHeader::session_message(payload.len() as u32)?;
        Ok(Self { header, payload })
    }

    pub fn positive_response() -> Result<Self> {
        let header = NetBiosHeader::new(NetBiosMessageType::PositiveResponse, 0)?;
        Ok(Self {
            header,
            payload: Vec::new(),
        })
    }

    pub fn negative_response(error_code: u8) -> Result<Self> {
        let header = NetBiosHeader::new(NetBiosMessageType::NegativeResponse, 1)?;
        Ok(Self {
            header,
            payload: vec![error_code],
        })
    }

    pub fn keepalive() -> Result<Self> {
        let header = NetBiosHeader::new(NetBiosMessageType::Keepalive, 0)?;
        Ok(Self {
            header,
            payload: Vec::new(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(NetBiosHeader::SIZE + self.payload.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        let header = NetBiosHeader::parse(buf)?;

        let total_len = NetBiosHeader::SIZE + header.length as usize;
        if buf.len() < total_len {
            return Err(Error::BufferTooSmall {
                need: total_len,
                have: buf.len(),
            });
        }

        let payload = buf[NetBiosHeader::SIZE..total_len].to_vec();
        Ok(Self { header, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parse() {
        let bytes = [0x00, 0x00, 0x12, 0x34];
        let header = NetBiosHeader::parse(&bytes).unwrap();
        assert_eq!(header.message_type, NetBiosMessageType::SessionMessage);
        assert_eq!(header.length, 0x1234);
    }

    #[test]
    fn test_header_serialize() {
        let header = NetBiosHeader::session_message(0x5678).unwrap();
        assert_eq!(header.to_bytes(), [0x00, 0x00, 0x56, 0x78]);
    }

    #[test]
    fn test_header_17_bit_length() {
        let header = NetBiosHeader::session_message(0x1FFFF).unwrap();
        assert_eq!(header.length, 0x1FFFF);
        let parsed = NetBiosHeader::parse(&header.to_bytes()).unwrap();
        assert_eq!(parsed.length, 0x1FFFF);

        assert!(NetBiosHeader::session_message(0x20000).is_err());
    }

    #[test]
    fn test_message_round_trip() {
        let payload = vec![1, 2, 3, 4, 5];
        let msg = NetBiosMessage::session_message(payload.clone()).unwrap();

        let bytes = msg.to_bytes();
        let parsed = NetBiosMessage::parse(&bytes).unwrap();
        assert_eq!(
            parsed.header.message_type,
            NetBiosMessageType::SessionMessage
        );
        assert_eq!(parsed.payload, payload);
    }

    #[test]
    fn test_keepalive() {
        let msg = NetBiosMessage::keepalive().unwrap();
        assert_eq!(msg.to_bytes(), [0x85, 0x00, 0x00, 0x00]);
    }
}
