//! SMB_COM_SESSION_SETUP_ANDX and SMB_COM_LOGOFF_ANDX
//!
//! Classic (pre-extended-security) NTLM logon: the client answers the
//! NEGOTIATE challenge with a case-insensitive (LM/LMv2) and a
//! case-sensitive (NTLM/NTLMv2) response plus account and domain strings.

use crate::auth::AuthOutcome;
use crate::error::{Error, Result};
use crate::protocol::header::Flags2;
use crate::server::connection::ConnectionHandler;
use crate::server::dispatcher::{CommandContext, CommandReply, ReplyBody};
use crate::server::handlers::andx_reply_params;
use crate::wire::{
    extract_ascii_string, extract_unicode_string, pad_to_align, read_u16_le, unicode_bytes_nul,
};
use crate::NtStatus;
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

const ACTION_GUEST: u16 = 0x0001;

pub async fn handle(conn: &mut ConnectionHandler, ctx: CommandContext) -> Result<CommandReply> {
    if ctx.params.len() < 26 {
        return Err(Error::ParseError("session setup params too short".into()));
    }
    let lm_len = read_u16_le(&ctx.params, 14)? as usize;
    let nt_len = read_u16_le(&ctx.params, 16)? as usize;

    if lm_len + nt_len > ctx.data.len() {
        return Err(Error::ParseError(
            "session setup responses exceed data block".into(),
        ));
    }
    let lm_response = &ctx.data[..lm_len];
    let nt_response = &ctx.data[lm_len..lm_len + nt_len];

    let unicode = ctx.header.flags2.contains(Flags2::UNICODE);
    let mut pos = lm_len + nt_len;
    if unicode {
        pos += pad_to_align(ctx.data_offset as usize + pos, 2);
    }
    let (account, consumed) = extract_string(&ctx.data, pos, unicode)?;
    pos += consumed;
    let (domain, _) = extract_string(&ctx.data, pos, unicode).unwrap_or_default();

    let challenge = *conn
        .challenge()
        .ok_or_else(|| Error::status(NtStatus::InvalidParameter, "session setup before negotiate"))?;

    let outcome = conn
        .server
        .auth
        .validate(&account, &domain, &challenge, lm_response, nt_response)?;

    let (account, guest) = match outcome {
        AuthOutcome::Authenticated { account } => (account, false),
        AuthOutcome::Guest => ("guest".to_string(), true),
    };
    debug!(account = %account, guest, "session setup");
    let uid = conn.register_session(account, domain, guest);

    let mut params = Vec::with_capacity(6);
    params.write_u16::<LittleEndian>(if guest { ACTION_GUEST } else { 0 })?;

    let mut data = vec![0u8]; // pad so the strings land on a word boundary
    data.extend_from_slice(&unicode_bytes_nul(&conn.server.config.native_os));
    data.extend_from_slice(&unicode_bytes_nul(&conn.server.config.native_lanman));
    data.extend_from_slice(&unicode_bytes_nul(&conn.server.config.workgroup));

    let mut body = ReplyBody::new(andx_reply_params(&params), data);
    body.set_uid = Some(uid);
    Ok(CommandReply::Done(body))
}

pub async fn handle_logoff(conn: &mut ConnectionHandler, ctx: CommandContext) -> Result<CommandReply> {
    if conn.remove_session(ctx.header.uid).is_none() {
        return Err(Error::status(
            NtStatus::SmbBadUid,
            format!("uid {}", ctx.header.uid),
        ));
    }
    debug!(uid = ctx.header.uid, "logoff");
    Ok(CommandReply::Done(ReplyBody::new(
        andx_reply_params(&[]),
        Vec::new(),
    )))
}

fn extract_string(buf: &[u8], off: usize, unicode: bool) -> Result<(String, usize)> {
    if unicode {
        extract_unicode_string(buf, off)
    } else {
        extract_ascii_string(buf, off)
    }
}
