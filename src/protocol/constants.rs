//! Protocol constants for NetBIOS and SMB1

use std::convert::TryFrom;

/// NetBIOS header size
pub const NBT_HDR_SIZE: usize = 4;

/// Minimum SMB1 message size: 32-byte header + word count + byte count
pub const SMB_MIN_LENGTH: usize = 35;

/// Maximum SMB1 message size, bounded by the 17-bit NetBIOS session length
pub const SMB_MAX_LENGTH: usize = 0x1FFFF;

/// SMB1 protocol magic
pub const SMB1_MAGIC: [u8; 4] = [0xFF, b'S', b'M', b'B'];

/// The one dialect this server speaks
pub const DIALECT_NT_LM_012: &str = "NT LM 0.12";

/// NetBIOS message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NetBiosMessageType {
    SessionMessage = 0x00,
    SessionRequest = 0x81,
    PositiveResponse = 0x82,
    NegativeResponse = 0x83,
    RetargetResponse = 0x84,
    Keepalive = 0x85,
}

impl TryFrom<u8> for NetBiosMessageType {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(NetBiosMessageType::SessionMessage),
            0x81 => Ok(NetBiosMessageType::SessionRequest),
            0x82 => Ok(NetBiosMessageType::PositiveResponse),
            0x83 => Ok(NetBiosMessageType::NegativeResponse),
            0x84 => Ok(NetBiosMessageType::RetargetResponse),
            0x85 => Ok(NetBiosMessageType::Keepalive),
            _ => Err(crate::error::Error::ParseError(format!(
                "Invalid NetBIOS message type: 0x{:02x}",
                value
            ))),
        }
    }
}

/// SMB1 command codes (MS-CIFS 2.2.2.1)
pub mod command {
    pub const CREATE_DIRECTORY: u8 = 0x00;
    pub const DELETE_DIRECTORY: u8 = 0x01;
    pub const CLOSE: u8 = 0x04;
    pub const FLUSH: u8 = 0x05;
    pub const DELETE: u8 = 0x06;
    pub const RENAME: u8 = 0x07;
    pub const QUERY_INFORMATION: u8 = 0x08;
    pub const SET_INFORMATION: u8 = 0x09;
    pub const CHECK_DIRECTORY: u8 = 0x10;
    pub const LOCKING_ANDX: u8 = 0x24;
    pub const TRANSACTION: u8 = 0x25;
    pub const ECHO: u8 = 0x2B;
    pub const OPEN_ANDX: u8 = 0x2D;
    pub const READ_ANDX: u8 = 0x2E;
    pub const WRITE_ANDX: u8 = 0x2F;
    pub const TRANSACTION2: u8 = 0x32;
    pub const FIND_CLOSE2: u8 = 0x34;
    pub const TREE_DISCONNECT: u8 = 0x71;
    pub const NEGOTIATE: u8 = 0x72;
    pub const SESSION_SETUP_ANDX: u8 = 0x73;
    pub const LOGOFF_ANDX: u8 = 0x74;
    pub const TREE_CONNECT_ANDX: u8 = 0x75;
    pub const NT_TRANSACT: u8 = 0xA0;
    pub const NT_CREATE_ANDX: u8 = 0xA2;
    pub const NT_CANCEL: u8 = 0xA4;

    /// AndX chain terminator in the AndXCommand field
    pub const NO_ANDX_COMMAND: u8 = 0xFF;
}

/// Commands whose parameter block starts with an AndX linkage
/// (AndXCommand, AndXReserved, AndXOffset).
pub const ANDX_COMMANDS: &[u8] = &[
    command::LOCKING_ANDX,
    command::OPEN_ANDX,
    command::READ_ANDX,
    command::WRITE_ANDX,
    command::SESSION_SETUP_ANDX,
    command::LOGOFF_ANDX,
    command::TREE_CONNECT_ANDX,
    command::NT_CREATE_ANDX,
];

/// Whether a command carries AndX linkage words.
pub fn is_andx_command(id: u8) -> bool {
    ANDX_COMMANDS.contains(&id)
}

/// Name of a known SMB1 command, `None` for ids outside the dialect.
///
/// Known-but-unhandled commands answer `STATUS_NOT_IMPLEMENTED`; ids this
/// table does not know answer `STATUS_SMB_BAD_COMMAND`.
pub fn command_name(id: u8) -> Option<&'static str> {
    let name = match id {
        0x00 => "SMB_COM_CREATE_DIRECTORY",
        0x01 => "SMB_COM_DELETE_DIRECTORY",
        0x02 => "SMB_COM_OPEN",
        0x03 => "SMB_COM_CREATE",
        0x04 => "SMB_COM_CLOSE",
        0x05 => "SMB_COM_FLUSH",
        0x06 => "SMB_COM_DELETE",
        0x07 => "SMB_COM_RENAME",
        0x08 => "SMB_COM_QUERY_INFORMATION",
        0x09 => "SMB_COM_SET_INFORMATION",
        0x0A => "SMB_COM_READ",
        0x0B => "SMB_COM_WRITE",
        0x0C => "SMB_COM_LOCK_BYTE_RANGE",
        0x0D => "SMB_COM_UNLOCK_BYTE_RANGE",
        0x0E => "SMB_COM_CREATE_TEMPORARY",
        0x0F => "SMB_COM_CREATE_NEW",
        0x10 => "SMB_COM_CHECK_DIRECTORY",
        0x11 => "SMB_COM_PROCESS_EXIT",
        0x12 => "SMB_COM_SEEK",
        0x13 => "SMB_COM_LOCK_AND_READ",
        0x14 => "SMB_COM_WRITE_AND_UNLOCK",
        0x1A => "SMB_COM_READ_RAW",
        0x1D => "SMB_COM_WRITE_RAW",
        0x22 => "SMB_COM_SET_INFORMATION2",
        0x23 => "SMB_COM_QUERY_INFORMATION2",
        0x24 => "SMB_COM_LOCKING_ANDX",
        0x25 => "SMB_COM_TRANSACTION",
        0x26 => "SMB_COM_TRANSACTION_SECONDARY",
        0x27 => "SMB_COM_IOCTL",
        0x2A => "SMB_COM_MOVE",
        0x2B => "SMB_COM_ECHO",
        0x2C => "SMB_COM_WRITE_AND_CLOSE",
        0x2D => "SMB_COM_OPEN_ANDX",
        0x2E => "SMB_COM_READ_ANDX",
        0x2F => "SMB_COM_WRITE_ANDX",
        0x31 => "SMB_COM_CLOSE_AND_TREE_DISC",
        0x32 => "SMB_COM_TRANSACTION2",
        0x33 => "SMB_COM_TRANSACTION2_SECONDARY",
        0x34 => "SMB_COM_FIND_CLOSE2",
        0x35 => "SMB_COM_FIND_NOTIFY_CLOSE",
        0x70 => "SMB_COM_TREE_CONNECT",
        0x71 => "SMB_COM_TREE_DISCONNECT",
        0x72 => "SMB_COM_NEGOTIATE",
        0x73 => "SMB_COM_SESSION_SETUP_ANDX",
        0x74 => "SMB_COM_LOGOFF_ANDX",
        0x75 => "SMB_COM_TREE_CONNECT_ANDX",
        0x80 => "SMB_COM_QUERY_INFORMATION_DISK",
        0x81 => "SMB_COM_SEARCH",
        0x82 => "SMB_COM_FIND",
        0x83 => "SMB_COM_FIND_UNIQUE",
        0x84 => "SMB_COM_FIND_CLOSE",
        0xA0 => "SMB_COM_NT_TRANSACT",
        0xA1 => "SMB_COM_NT_TRANSACT_SECONDARY",
        0xA2 => "SMB_COM_NT_CREATE_ANDX",
        0xA4 => "SMB_COM_NT_CANCEL",
        0xA5 => "SMB_COM_NT_RENAME",
        0xC0 => "SMB_COM_OPEN_PRINT_FILE",
        0xC1 => "SMB_COM_WRITE_PRINT_FILE",
        0xC2 => "SMB_COM_CLOSE_PRINT_FILE",
        _ => return None,
    };
    Some(name)
}

/// Server capability bits advertised in the NEGOTIATE response
pub mod capabilities {
    pub const CAP_RAW_MODE: u32 = 0x0000_0001;
    pub const CAP_UNICODE: u32 = 0x0000_0004;
    pub const CAP_LARGE_FILES: u32 = 0x0000_0008;
    pub const CAP_NT_SMBS: u32 = 0x0000_0010;
    pub const CAP_STATUS32: u32 = 0x0000_0040;
    pub const CAP_LEVEL_II_OPLOCKS: u32 = 0x0000_0080;
    pub const CAP_NT_FIND: u32 = 0x0000_0200;
    pub const CAP_LARGE_READX: u32 = 0x0000_4000;
}

/// Extended file attribute bits
pub mod file_attributes {
    pub const READONLY: u32 = 0x0000_0001;
    pub const HIDDEN: u32 = 0x0000_0002;
    pub const SYSTEM: u32 = 0x0000_0004;
    pub const DIRECTORY: u32 = 0x0000_0010;
    pub const ARCHIVE: u32 = 0x0000_0020;
    pub const NORMAL: u32 = 0x0000_0080;
}

/// NT_CREATE_ANDX request flag bits
pub mod nt_create_flags {
    pub const REQUEST_OPLOCK: u32 = 0x0000_0002;
    pub const REQUEST_OPBATCH: u32 = 0x0000_0004;
    pub const OPEN_TARGET_DIR: u32 = 0x0000_0008;
    pub const EXTENDED_RESPONSE: u32 = 0x0000_0010;
}

/// CreateOptions bits consulted by NT_CREATE_ANDX
pub mod create_options {
    pub const FILE_DIRECTORY_FILE: u32 = 0x0000_0001;
    pub const FILE_NON_DIRECTORY_FILE: u32 = 0x0000_0040;
    pub const FILE_DELETE_ON_CLOSE: u32 = 0x0000_1000;
}

/// CreateDisposition values
pub mod create_disposition {
    pub const FILE_SUPERSEDE: u32 = 0x00;
    pub const FILE_OPEN: u32 = 0x01;
    pub const FILE_CREATE: u32 = 0x02;
    pub const FILE_OPEN_IF: u32 = 0x03;
    pub const FILE_OVERWRITE: u32 = 0x04;
    pub const FILE_OVERWRITE_IF: u32 = 0x05;
}

/// CreateAction values reported back to the client
pub mod create_action {
    pub const FILE_OPENED: u32 = 0x01;
    pub const FILE_CREATED: u32 = 0x02;
    pub const FILE_OVERWRITTEN: u32 = 0x03;
}

/// ResourceType in the NT_CREATE_ANDX response
pub const FILE_TYPE_DISK: u16 = 0x0000;
pub const FILE_TYPE_MESSAGEMODEPIPE: u16 = 0x0005;

/// FileStatusFlags bits in the extended NT_CREATE_ANDX response
pub mod file_status_flags {
    pub const NO_EAS: u16 = 0x0001;
    pub const NO_SUBSTREAMS: u16 = 0x0002;
    pub const NO_REPARSETAG: u16 = 0x0004;
}

/// Oplock levels granted in NT_CREATE_ANDX responses
pub mod oplock_level {
    pub const NONE: u8 = 0x00;
    pub const BATCH: u8 = 0x02;
}

/// Fixed absolute offset (from the SMB header) of the payload in a
/// READ_ANDX response: 32-byte header, word count, 12 parameter words,
/// byte count, one pad byte.
pub const READ_ANDX_DATA_OFFSET: u16 = 60;

/// TRANSACTION2 subcommand codes
pub mod trans2 {
    pub const FIND_FIRST2: u16 = 0x0001;
    pub const FIND_NEXT2: u16 = 0x0002;
    pub const QUERY_FS_INFORMATION: u16 = 0x0003;
    pub const QUERY_PATH_INFORMATION: u16 = 0x0005;
    pub const SET_PATH_INFORMATION: u16 = 0x0006;
    pub const QUERY_FILE_INFORMATION: u16 = 0x0007;
    pub const SET_FILE_INFORMATION: u16 = 0x0008;
}

/// TRANS2 information levels
pub mod info_level {
    /// NT pass-through levels start here; the native FILE_*_INFORMATION
    /// class is `level - INFO_PASSTHROUGH`.
    pub const INFO_PASSTHROUGH: u16 = 1000;

    // Query path/file levels
    pub const QUERY_FILE_BASIC_INFO: u16 = 0x0101;
    pub const QUERY_FILE_STANDARD_INFO: u16 = 0x0102;
    pub const QUERY_FILE_ALL_INFO: u16 = 0x0107;

    // Find levels
    pub const FIND_FILE_BOTH_DIRECTORY_INFO: u16 = 0x0104;

    // Query FS levels
    pub const QUERY_FS_VOLUME_INFO: u16 = 0x0102;
    pub const QUERY_FS_SIZE_INFO: u16 = 0x0103;
    pub const QUERY_FS_DEVICE_INFO: u16 = 0x0104;
    pub const QUERY_FS_ATTRIBUTE_INFO: u16 = 0x0105;

    // FILE_*_INFORMATION classes reachable through pass-through levels
    pub const FILE_RENAME_INFORMATION: u16 = 10;
    pub const FILE_DISPOSITION_INFORMATION: u16 = 13;
    pub const FILE_ALLOCATION_INFORMATION: u16 = 19;
    pub const FILE_END_OF_FILE_INFORMATION: u16 = 20;
    pub const FILE_BASIC_INFORMATION: u16 = 4;
    pub const FILE_STANDARD_INFORMATION: u16 = 5;
}

/// FIND_FIRST2/FIND_NEXT2 flag bits
pub mod find_flags {
    pub const CLOSE_AFTER_REQUEST: u16 = 0x0001;
    pub const CLOSE_AT_END_OF_SEARCH: u16 = 0x0002;
    pub const RETURN_RESUME_KEYS: u16 = 0x0004;
    pub const CONTINUE_FROM_LAST: u16 = 0x0008;
}
