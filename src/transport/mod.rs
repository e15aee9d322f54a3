//! Stream transports carrying NetBIOS-framed SMB messages

pub mod tcp;

pub use tcp::TcpTransport;
