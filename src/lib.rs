//! SMB1/CIFS gateway in Rust
//!
//! A user-space SMB 1.0 server exposing read-mostly virtual file trees to
//! standard SMB clients. The bundled `webfs` backend projects an
//! HTTP-addressable content source as a browsable share, streaming file bytes
//! on demand through a bounded-lookahead range prefetcher.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod error;
pub mod netbios;
pub mod protocol;
pub mod rectifier;
pub mod server;
pub mod transport;
pub mod vfs;
pub mod webfs;
pub mod wire;

#[cfg(test)]
pub mod e2e_tests;

pub use error::{Error, NtStatus, Result};
