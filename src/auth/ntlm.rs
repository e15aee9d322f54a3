//! NTLMv2 client blob and target information pairs
//!
//! The blob is the client-generated structure embedded in an NTLMv2
//! response and covered by its HMAC. The server parses it to recover the
//! client challenge and target info when validating a logon.

use crate::error::{Error, Result};
use crate::wire::{read_u16_le, read_u32_le, read_u64_le};
use byteorder::{LittleEndian, WriteBytesExt};

/// Blob version signature, `0x0101` followed by two reserved zero bytes.
const BLOB_SIGNATURE: [u8; 4] = [0x01, 0x01, 0x00, 0x00];

/// Target info attribute types (MsvAv*)
pub mod av_id {
    pub const EOL: u16 = 0x0000;
    pub const NB_COMPUTER_NAME: u16 = 0x0001;
    pub const NB_DOMAIN_NAME: u16 = 0x0002;
    pub const DNS_COMPUTER_NAME: u16 = 0x0003;
    pub const DNS_DOMAIN_NAME: u16 = 0x0004;
    pub const TIMESTAMP: u16 = 0x0007;
}

/// Parsed NTLMv2 blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtlmV2Blob {
    /// 100-ns ticks since 1601-01-01
    pub timestamp: u64,
    pub client_challenge: [u8; 8],
    /// Ordered (type, value) pairs, terminator excluded
    pub target_info: Vec<(u16, Vec<u8>)>,
    /// Bytes after the trailing reserved word, if the client sent any
    pub trailer: Vec<u8>,
}

impl NtlmV2Blob {
    pub fn new(timestamp: u64, client_challenge: [u8; 8], target_info: Vec<(u16, Vec<u8>)>) -> Self {
        Self {
            timestamp,
            client_challenge,
            target_info,
            trailer: Vec::new(),
        }
    }

    /// Parse a blob as found after the 16-byte HMAC of an NTLMv2 response.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 36 {
            return Err(Error::ParseError(format!(
                "NTLMv2 blob too short: {} bytes",
                buf.len()
            )));
        }
        if buf[0..4] != BLOB_SIGNATURE {
            return Err(Error::ParseError("bad NTLMv2 blob signature".into()));
        }
        if read_u32_le(buf, 4)? != 0 {
            return Err(Error::ParseError("non-zero NTLMv2 blob reserved field".into()));
        }

        let timestamp = read_u64_le(buf, 8)?;
        let mut client_challenge = [0u8; 8];
        client_challenge.copy_from_slice(&buf[16..24]);
        // 4 unknown bytes at 24..28, then the AV pair list
        let mut pos = 28;
        let mut target_info = Vec::new();
        loop {
            let av_type = read_u16_le(buf, pos)?;
            let av_len = read_u16_le(buf, pos + 2)? as usize;
            pos += 4;
            if av_type == av_id::EOL {
                if av_len != 0 {
                    return Err(Error::ParseError("NTLMv2 terminator with payload".into()));
                }
                break;
            }
            if pos + av_len > buf.len() {
                return Err(Error::BufferTooSmall {
                    need: pos + av_len,
                    have: buf.len(),
                });
            }
            target_info.push((av_type, buf[pos..pos + av_len].to_vec()));
            pos += av_len;
        }

        // Trailing reserved word, then anything else the client appended
        let trailer = if pos + 4 <= buf.len() {
            buf[pos + 4..].to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            timestamp,
            client_challenge,
            target_info,
            trailer,
        })
    }

    /// Serialize the blob in wire order.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut blob = Vec::new();
        blob.extend_from_slice(&BLOB_SIGNATURE);
        blob.write_u32::<LittleEndian>(0)?;
        blob.write_u64::<LittleEndian>(self.timestamp)?;
        blob.extend_from_slice(&self.client_challenge);
        blob.write_u32::<LittleEndian>(0)?;
        for (av_type, value) in &self.target_info {
            blob.write_u16::<LittleEndian>(*av_type)?;
            blob.write_u16::<LittleEndian>(value.len() as u16)?;
            blob.extend_from_slice(value);
        }
        blob.write_u16::<LittleEndian>(av_id::EOL)?;
        blob.write_u16::<LittleEndian>(0)?;
        blob.write_u32::<LittleEndian>(0)?;
        blob.extend_from_slice(&self.trailer);
        Ok(blob)
    }
}
