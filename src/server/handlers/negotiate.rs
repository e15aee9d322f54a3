//! SMB_COM_NEGOTIATE
//!
//! Dialect selection and challenge issue. Only `NT LM 0.12` is spoken; the
//! 8-byte challenge generated here is the reference for every subsequent
//! SESSION_SETUP_ANDX on the connection.

use crate::auth::ntlm_crypto::generate_challenge;
use crate::error::Result;
use crate::protocol::constants::{capabilities, DIALECT_NT_LM_012};
use crate::server::connection::ConnectionHandler;
use crate::server::dispatcher::{CommandContext, CommandReply};
use crate::server::handlers::done;
use crate::wire::{system_to_smb_time, unicode_bytes_nul};
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

const SECURITY_USER_LEVEL: u8 = 0x01;
const SECURITY_CHALLENGE_RESPONSE: u8 = 0x02;

const MAX_MPX_COUNT: u16 = 50;
const MAX_VCS: u16 = 1;
const MAX_RAW_SIZE: u32 = 65536;

pub async fn handle(conn: &mut ConnectionHandler, ctx: CommandContext) -> Result<CommandReply> {
    let dialects = parse_dialects(&ctx.data);
    debug!(?dialects, "negotiate");

    let index = match dialects.iter().position(|d| d == DIALECT_NT_LM_012) {
        Some(index) => index as u16,
        None => {
            // No common dialect: index 0xFFFF, nothing else
            let mut params = Vec::with_capacity(2);
            params.write_u16::<LittleEndian>(0xFFFF)?;
            return Ok(done(params, Vec::new()));
        }
    };

    let challenge = generate_challenge();
    conn.set_challenge(challenge);

    let caps = capabilities::CAP_UNICODE
        | capabilities::CAP_LARGE_FILES
        | capabilities::CAP_NT_SMBS
        | capabilities::CAP_STATUS32
        | capabilities::CAP_LEVEL_II_OPLOCKS
        | capabilities::CAP_NT_FIND
        | capabilities::CAP_LARGE_READX;

    let now_ms = chrono::Utc::now().timestamp_millis();

    let mut params = Vec::with_capacity(34);
    params.write_u16::<LittleEndian>(index)?;
    params.write_u8(SECURITY_USER_LEVEL | SECURITY_CHALLENGE_RESPONSE)?;
    params.write_u16::<LittleEndian>(MAX_MPX_COUNT)?;
    params.write_u16::<LittleEndian>(MAX_VCS)?;
    params.write_u32::<LittleEndian>(conn.server.config.max_buffer_size)?;
    params.write_u32::<LittleEndian>(MAX_RAW_SIZE)?;
    params.write_u32::<LittleEndian>(0)?; // session key
    params.write_u32::<LittleEndian>(caps)?;
    params.write_u64::<LittleEndian>(system_to_smb_time(now_ms))?;
    params.write_i16::<LittleEndian>(0)?; // server time zone, minutes from UTC
    params.write_u8(challenge.len() as u8)?;

    let mut data = Vec::new();
    data.extend_from_slice(&challenge);
    data.extend_from_slice(&unicode_bytes_nul(&conn.server.config.workgroup));
    data.extend_from_slice(&unicode_bytes_nul(&conn.server.config.server_name));

    Ok(done(params, data))
}

/// Request data is a list of `0x02`-prefixed null-terminated dialect names.
fn parse_dialects(data: &[u8]) -> Vec<String> {
    let mut dialects = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        if data[pos] != 0x02 {
            break;
        }
        pos += 1;
        let start = pos;
        while pos < data.len() && data[pos] != 0 {
            pos += 1;
        }
        dialects.push(String::from_utf8_lossy(&data[start..pos]).into_owned());
        pos += 1;
    }
    dialects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dialects() {
        let data = b"\x02PC NETWORK PROGRAM 1.0\x00\x02LANMAN1.0\x00\x02NT LM 0.12\x00";
        let dialects = parse_dialects(data);
        assert_eq!(
            dialects,
            vec!["PC NETWORK PROGRAM 1.0", "LANMAN1.0", "NT LM 0.12"]
        );
    }

    #[test]
    fn test_parse_dialects_garbage() {
        assert!(parse_dialects(b"\x07nope").is_empty());
        assert!(parse_dialects(b"").is_empty());
    }
}
