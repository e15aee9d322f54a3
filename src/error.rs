//! Error types and NTSTATUS taxonomy for the gateway

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Message framing error (rejected before dispatch)
    #[error("Framing error: {0}")]
    Framing(String),

    /// Protocol parsing error
    #[error("Protocol parsing error: {0}")]
    ParseError(String),

    /// Invalid SMB header
    #[error("Invalid SMB header: {0}")]
    InvalidHeader(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Connection closed by peer
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Buffer too small
    #[error("Buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    /// Invalid NetBIOS name
    #[error("Invalid NetBIOS name: {0}")]
    InvalidNetBiosName(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Cryptographic primitive failure
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// HTTP transfer error from the remote origin
    #[error("Upstream HTTP error: {0}")]
    Http(String),

    /// An explicit NTSTATUS carried up from a handler or backend
    #[error("{message} ({status})")]
    Status { status: NtStatus, message: String },
}

impl Error {
    /// Build an error carrying an explicit NTSTATUS.
    pub fn status(status: NtStatus, message: impl Into<String>) -> Self {
        Error::Status {
            status,
            message: message.into(),
        }
    }

    /// Map this error onto the NTSTATUS surfaced to the client.
    ///
    /// Total: every variant resolves to a status; anything without a more
    /// specific meaning collapses to `Unsuccessful`.
    pub fn nt_status(&self) -> NtStatus {
        match self {
            Error::Status { status, .. } => *status,
            Error::Io(e) => NtStatus::from_io_error(e),
            Error::Framing(_) | Error::ParseError(_) | Error::InvalidHeader(_) => {
                NtStatus::InvalidSmb
            }
            Error::AuthenticationFailed(_) => NtStatus::LogonFailure,
            Error::BufferTooSmall { .. } => NtStatus::BufferTooSmall,
            Error::InvalidParameter(_) => NtStatus::InvalidParameter,
            Error::Http(_) => NtStatus::Unsuccessful,
            Error::ConnectionClosed
            | Error::ConnectionError(_)
            | Error::InvalidNetBiosName(_)
            | Error::CryptoError(_) => NtStatus::Unsuccessful,
        }
    }
}

/// NTSTATUS values surfaced in the SMB header.
///
/// The `Smb*` variants are DOS error class/code pairs kept for interop with
/// pre-NT dialect semantics; they are still what clients expect for bad
/// TID/FID/UID/command conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NtStatus {
    /// The operation completed successfully
    Success = 0x00000000,
    /// No more files match the search
    NoMoreFiles = 0x80000006,
    /// The operation failed with no more specific status
    Unsuccessful = 0xC0000001,
    /// The request is not implemented
    NotImplemented = 0xC0000002,
    /// The server received a malformed SMB
    InvalidSmb = 0x00010002,
    /// The TID does not name a connected tree
    SmbBadTid = 0x00050002,
    /// The FID does not name an open file
    SmbBadFid = 0x00060001,
    /// The UID does not name a logged-on session
    SmbBadUid = 0x005B0002,
    /// The command is not known to the server
    SmbBadCommand = 0x00160002,
    /// The handle is invalid
    InvalidHandle = 0xC0000008,
    /// The parameter is incorrect
    InvalidParameter = 0xC000000D,
    /// The file does not exist
    NoSuchFile = 0xC000000F,
    /// End of file reached
    EndOfFile = 0xC0000011,
    /// More processing is required to complete the request
    MoreProcessingRequired = 0xC0000016,
    /// Access denied
    AccessDenied = 0xC0000022,
    /// The buffer is too small
    BufferTooSmall = 0xC0000023,
    /// The object name is not found
    ObjectNameNotFound = 0xC0000034,
    /// Cannot create a file that already exists
    ObjectNameCollision = 0xC0000035,
    /// The user name or password is incorrect
    LogonFailure = 0xC000006D,
    /// The file is a directory
    FileIsADirectory = 0xC00000BA,
    /// The request is not supported
    NotSupported = 0xC00000BB,
    /// The share name is invalid
    BadNetworkName = 0xC00000CC,
    /// Access to the network resource was denied
    NetworkAccessDenied = 0xC00000CA,
    /// The directory is not empty
    DirectoryNotEmpty = 0xC0000101,
    /// The object is not a directory
    NotADirectory = 0xC0000103,
    /// The file cannot be deleted
    CannotDelete = 0xC0000121,
}

impl NtStatus {
    /// Check if this is a success status
    pub fn is_success(self) -> bool {
        self == NtStatus::Success
    }

    /// Check if this is an error-severity status
    pub fn is_error(self) -> bool {
        (self as u32) & 0xC0000000 == 0xC0000000
    }

    /// Map an OS errno onto an NTSTATUS.
    ///
    /// Total over all errno values; anything outside the table is
    /// `Unsuccessful`.
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc_consts::EINVAL => NtStatus::NotImplemented,
            libc_consts::ENOENT => NtStatus::NoSuchFile,
            libc_consts::EPERM => NtStatus::AccessDenied,
            libc_consts::EBADF => NtStatus::SmbBadFid,
            libc_consts::EEXIST => NtStatus::ObjectNameCollision,
            libc_consts::EACCES => NtStatus::NetworkAccessDenied,
            _ => NtStatus::Unsuccessful,
        }
    }

    /// Map a `std::io::Error` onto an NTSTATUS, preferring the raw errno
    /// when the OS supplied one.
    pub fn from_io_error(err: &io::Error) -> Self {
        if let Some(errno) = err.raw_os_error() {
            return Self::from_errno(errno);
        }
        match err.kind() {
            io::ErrorKind::NotFound => NtStatus::NoSuchFile,
            io::ErrorKind::PermissionDenied => NtStatus::AccessDenied,
            io::ErrorKind::AlreadyExists => NtStatus::ObjectNameCollision,
            io::ErrorKind::InvalidInput => NtStatus::NotImplemented,
            io::ErrorKind::UnexpectedEof => NtStatus::EndOfFile,
            _ => NtStatus::Unsuccessful,
        }
    }
}

/// The errno constants the taxonomy maps. Spelled out here so the table
/// stays readable without pulling in libc.
mod libc_consts {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const EBADF: i32 = 9;
    pub const EACCES: i32 = 13;
    pub const EEXIST: i32 = 17;
    pub const EINVAL: i32 = 22;
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            NtStatus::Success => "Success",
            NtStatus::NoMoreFiles => "No more files",
            NtStatus::Unsuccessful => "Unsuccessful",
            NtStatus::NotImplemented => "Not implemented",
            NtStatus::InvalidSmb => "Invalid SMB",
            NtStatus::SmbBadTid => "Bad TID",
            NtStatus::SmbBadFid => "Bad FID",
            NtStatus::SmbBadUid => "Bad UID",
            NtStatus::SmbBadCommand => "Bad command",
            NtStatus::InvalidHandle => "Invalid handle",
            NtStatus::InvalidParameter => "Invalid parameter",
            NtStatus::NoSuchFile => "No such file",
            NtStatus::EndOfFile => "End of file",
            NtStatus::MoreProcessingRequired => "More processing required",
            NtStatus::AccessDenied => "Access denied",
            NtStatus::BufferTooSmall => "Buffer too small",
            NtStatus::ObjectNameNotFound => "Object name not found",
            NtStatus::ObjectNameCollision => "Object name collision",
            NtStatus::LogonFailure => "Logon failure",
            NtStatus::FileIsADirectory => "File is a directory",
            NtStatus::NotSupported => "Not supported",
            NtStatus::BadNetworkName => "Bad network name",
            NtStatus::NetworkAccessDenied => "Network access denied",
            NtStatus::DirectoryNotEmpty => "Directory not empty",
            NtStatus::NotADirectory => "Not a directory",
            NtStatus::CannotDelete => "Cannot delete",
        };
        write!(f, "{} (0x{:08X})", msg, *self as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ntstatus_severity() {
        assert!(NtStatus::Success.is_success());
        assert!(!NtStatus::Success.is_error());
        assert!(NtStatus::AccessDenied.is_error());
        assert!(!NtStatus::NoMoreFiles.is_error());
    }

    #[test]
    fn test_errno_table_total() {
        assert_eq!(NtStatus::from_errno(22), NtStatus::NotImplemented);
        assert_eq!(NtStatus::from_errno(2), NtStatus::NoSuchFile);
        assert_eq!(NtStatus::from_errno(1), NtStatus::AccessDenied);
        assert_eq!(NtStatus::from_errno(9), NtStatus::SmbBadFid);
        assert_eq!(NtStatus::from_errno(17), NtStatus::ObjectNameCollision);
        assert_eq!(NtStatus::from_errno(13), NtStatus::NetworkAccessDenied);
        // Everything outside the table collapses to Unsuccessful
        for errno in [0, 3, 99, 4096, -1] {
            assert_eq!(NtStatus::from_errno(errno), NtStatus::Unsuccessful);
        }
    }

    #[test]
    fn test_io_error_mapping() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(NtStatus::from_io_error(&eof), NtStatus::EndOfFile);

        let enoent = io::Error::from_raw_os_error(2);
        assert_eq!(NtStatus::from_io_error(&enoent), NtStatus::NoSuchFile);
    }

    #[test]
    fn test_error_nt_status_total() {
        let cases: Vec<(Error, NtStatus)> = vec![
            (Error::Framing("short".into()), NtStatus::InvalidSmb),
            (
                Error::AuthenticationFailed("bad password".into()),
                NtStatus::LogonFailure,
            ),
            (
                Error::status(NtStatus::NoSuchFile, "gone"),
                NtStatus::NoSuchFile,
            ),
            (Error::ConnectionClosed, NtStatus::Unsuccessful),
            (Error::Http("502".into()), NtStatus::Unsuccessful),
        ];
        for (err, status) in cases {
            assert_eq!(err.nt_status(), status);
        }
    }
}
