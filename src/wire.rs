//! Binary codec utilities shared by the protocol layer
//!
//! Little-endian readers over byte slices, UTF-16LE string handling with the
//! 2-byte alignment rules SMB1 imposes, and SMB-time conversions.

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Offset of the Unix epoch from the SMB epoch (1601-01-01), in milliseconds.
const SMB_EPOCH_OFFSET_MS: i64 = 11_644_473_600_000;

fn check_len(buf: &[u8], off: usize, need: usize) -> Result<()> {
    if off + need > buf.len() {
        return Err(Error::BufferTooSmall {
            need: off + need,
            have: buf.len(),
        });
    }
    Ok(())
}

/// Read a little-endian u16 at `off`.
pub fn read_u16_le(buf: &[u8], off: usize) -> Result<u16> {
    check_len(buf, off, 2)?;
    Ok(LittleEndian::read_u16(&buf[off..off + 2]))
}

/// Read a little-endian u32 at `off`.
pub fn read_u32_le(buf: &[u8], off: usize) -> Result<u32> {
    check_len(buf, off, 4)?;
    Ok(LittleEndian::read_u32(&buf[off..off + 4]))
}

/// Read a little-endian u64 at `off`.
pub fn read_u64_le(buf: &[u8], off: usize) -> Result<u64> {
    check_len(buf, off, 8)?;
    Ok(LittleEndian::read_u64(&buf[off..off + 8]))
}

/// Bytes to skip so that `absolute_offset` lands on the next `alignment`
/// boundary. Zero when already aligned.
pub fn pad_to_align(absolute_offset: usize, alignment: usize) -> usize {
    let rem = absolute_offset % alignment;
    if rem == 0 {
        0
    } else {
        alignment - rem
    }
}

/// Extract a null-terminated UTF-16LE string starting at `off`.
///
/// Returns the decoded string and the number of bytes consumed including the
/// two terminator bytes. The terminator must sit on a code-unit boundary
/// relative to `off`.
pub fn extract_unicode_string(buf: &[u8], off: usize) -> Result<(String, usize)> {
    let mut units = Vec::new();
    let mut pos = off;
    loop {
        let unit = read_u16_le(buf, pos)?;
        pos += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    let s = String::from_utf16(&units)
        .map_err(|_| Error::ParseError("invalid UTF-16LE string".into()))?;
    Ok((s, pos - off))
}

/// Decode exactly `len` bytes at `off` as UTF-16LE (no terminator expected).
pub fn decode_unicode_bytes(buf: &[u8], off: usize, len: usize) -> Result<String> {
    check_len(buf, off, len)?;
    if len % 2 != 0 {
        return Err(Error::ParseError("odd UTF-16LE byte length".into()));
    }
    let units: Vec<u16> = buf[off..off + len]
        .chunks_exact(2)
        .map(LittleEndian::read_u16)
        .collect();
    String::from_utf16(&units).map_err(|_| Error::ParseError("invalid UTF-16LE string".into()))
}

/// Extract a null-terminated ASCII string starting at `off`.
///
/// Returns the string and bytes consumed including the terminator.
pub fn extract_ascii_string(buf: &[u8], off: usize) -> Result<(String, usize)> {
    let mut pos = off;
    loop {
        let byte = *buf.get(pos).ok_or(Error::BufferTooSmall {
            need: pos + 1,
            have: buf.len(),
        })?;
        pos += 1;
        if byte == 0 {
            break;
        }
    }
    let s = std::str::from_utf8(&buf[off..pos - 1])
        .map_err(|_| Error::ParseError("invalid ASCII string".into()))?
        .to_string();
    Ok((s, pos - off))
}

/// Encode a string as UTF-16LE without a terminator.
pub fn unicode_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Encode a string as UTF-16LE with a null terminator.
pub fn unicode_bytes_nul(s: &str) -> Vec<u8> {
    let mut bytes = unicode_bytes(s);
    bytes.extend_from_slice(&[0, 0]);
    bytes
}

/// Convert epoch milliseconds to SMB time (100-ns ticks since 1601-01-01).
pub fn system_to_smb_time(ms: i64) -> u64 {
    ((ms + SMB_EPOCH_OFFSET_MS) as u64) * 10_000
}

/// Convert SMB time back to epoch milliseconds.
pub fn smb_to_system_time(ticks: u64) -> i64 {
    (ticks / 10_000) as i64 - SMB_EPOCH_OFFSET_MS
}
