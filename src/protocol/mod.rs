//! SMB1 protocol definitions

pub mod constants;
pub mod header;
pub mod message;

pub use constants::NetBiosMessageType;
pub use header::{Flags1, Flags2, SmbHeader};
pub use message::{SmbCommand, SmbMessage};
