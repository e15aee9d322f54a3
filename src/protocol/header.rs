//! SMB1 message header

use crate::error::{Error, Result};
use crate::protocol::constants::SMB1_MAGIC;
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};

bitflags! {
    /// Flags byte of the SMB1 header
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags1: u8 {
        /// Paths in the message are already in canonical form
        const CANONICALIZED_PATHS = 0x10;
        /// Pathnames are case insensitive
        const CASE_INSENSITIVE = 0x08;
        /// Message is a server reply
        const REPLY = 0x80;
    }
}

bitflags! {
    /// Flags2 word of the SMB1 header
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags2: u16 {
        /// Client understands long (non-8.3) pathnames
        const KNOWS_LONG_NAMES = 0x0001;
        /// Client understands extended attributes
        const KNOWS_EAS = 0x0002;
        /// Message carries a security signature
        const SECURITY_SIGNATURE = 0x0004;
        /// Path in this message is a long pathname
        const IS_LONG_NAME = 0x0040;
        /// Extended security negotiation supported
        const EXTENDED_SECURITY = 0x0800;
        /// Path must be resolved through DFS
        const DFS = 0x1000;
        /// Read-if-execute permitted for paging I/O
        const PAGING_IO = 0x2000;
        /// Status field carries a 32-bit NTSTATUS
        const NT_STATUS = 0x4000;
        /// Strings in the message are UTF-16LE
        const UNICODE = 0x8000;
    }
}

/// SMB1 header, fixed at 32 bytes on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbHeader {
    pub command: u8,
    pub status: u32,
    pub flags1: Flags1,
    pub flags2: Flags2,
    pub pid_high: u16,
    pub signature: [u8; 8],
    pub tid: u16,
    pub pid: u16,
    pub uid: u16,
    pub mid: u16,
}

impl SmbHeader {
    pub const SIZE: usize = 32;

    pub fn new(command: u8) -> Self {
        Self {
            command,
            status: 0,
            flags1: Flags1::CASE_INSENSITIVE | Flags1::CANONICALIZED_PATHS,
            flags2: Flags2::KNOWS_LONG_NAMES | Flags2::NT_STATUS | Flags2::UNICODE,
            pid_high: 0,
            signature: [0; 8],
            tid: 0,
            pid: 0,
            uid: 0,
            mid: 0,
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                need: Self::SIZE,
                have: buf.len(),
            });
        }

        if buf[0..4] != SMB1_MAGIC {
            return Err(Error::InvalidHeader(format!(
                "bad protocol magic {:02x?}",
                &buf[0..4]
            )));
        }

        let mut cursor = io::Cursor::new(&buf[4..Self::SIZE]);
        let command = cursor.read_u8()?;
        let status = cursor.read_u32::<LittleEndian>()?;
        let flags1 = Flags1::from_bits_retain(cursor.read_u8()?);
        let flags2 = Flags2::from_bits_retain(cursor.read_u16::<LittleEndian>()?);
        let pid_high = cursor.read_u16::<LittleEndian>()?;
        let mut signature = [0u8; 8];
        cursor.read_exact(&mut signature)?;
        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let tid = cursor.read_u16::<LittleEndian>()?;
        let pid = cursor.read_u16::<LittleEndian>()?;
        let uid = cursor.read_u16::<LittleEndian>()?;
        let mid = cursor.read_u16::<LittleEndian>()?;

        Ok(Self {
            command,
            status,
            flags1,
            flags2,
            pid_high,
            signature,
            tid,
            pid,
            uid,
            mid,
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&SMB1_MAGIC);
        buf.write_u8(self.command)?;
        buf.write_u32::<LittleEndian>(self.status)?;
        buf.write_u8(self.flags1.bits())?;
        buf.write_u16::<LittleEndian>(self.flags2.bits())?;
        buf.write_u16::<LittleEndian>(self.pid_high)?;
        buf.extend_from_slice(&self.signature);
        buf.write_u16::<LittleEndian>(0)?; // reserved
        buf.write_u16::<LittleEndian>(self.tid)?;
        buf.write_u16::<LittleEndian>(self.pid)?;
        buf.write_u16::<LittleEndian>(self.uid)?;
        buf.write_u16::<LittleEndian>(self.mid)?;
        Ok(buf)
    }

    pub fn is_reply(&self) -> bool {
        self.flags1.contains(Flags1::REPLY)
    }

    /// Stamp the reply-side flag policy onto this header: reply, 32-bit
    /// status, unicode strings, long pathnames.
    pub fn mark_reply(&mut self) {
        self.flags1 |= Flags1::REPLY;
        self.flags2 |= Flags2::NT_STATUS | Flags2::UNICODE | Flags2::KNOWS_LONG_NAMES;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let mut header = SmbHeader::new(0x72);
        header.status = 0xC000_000F;
        header.tid = 3;
        header.uid = 0x1234;
        header.mid = 7;
        header.mark_reply();

        let bytes = header.serialize().unwrap();
        assert_eq!(bytes.len(), SmbHeader::SIZE);
        assert_eq!(&bytes[0..4], &SMB1_MAGIC);

        let parsed = SmbHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.is_reply());
    }

    #[test]
    fn test_header_bad_magic() {
        let mut bytes = SmbHeader::new(0x72).serialize().unwrap();
        bytes[0] = 0xFE;
        assert!(SmbHeader::parse(&bytes).is_err());
    }

    #[test]
    fn test_mark_reply_policy() {
        let mut header = SmbHeader::new(0x2E);
        header.flags1 = Flags1::empty();
        header.flags2 = Flags2::empty();
        header.mark_reply();
        assert!(header.flags1.contains(Flags1::REPLY));
        assert!(header.flags2.contains(Flags2::NT_STATUS));
        assert!(header.flags2.contains(Flags2::UNICODE));
        assert!(header.flags2.contains(Flags2::KNOWS_LONG_NAMES));
    }
}
