//! SMB_COM_TREE_CONNECT_ANDX and SMB_COM_TREE_DISCONNECT

use crate::error::{Error, Result};
use crate::protocol::header::Flags2;
use crate::server::connection::ConnectionHandler;
use crate::server::dispatcher::{CommandContext, CommandReply, ReplyBody};
use crate::server::handlers::{andx_reply_params, done_empty};
use crate::wire::{
    extract_ascii_string, extract_unicode_string, pad_to_align, read_u16_le, unicode_bytes_nul,
};
use crate::NtStatus;
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

const SMB_SUPPORT_SEARCH_BITS: u16 = 0x0001;

const SERVICE_DISK: &str = "A:";
const SERVICE_NAMED_PIPE: &str = "IPC";

pub async fn handle_connect(
    conn: &mut ConnectionHandler,
    ctx: CommandContext,
) -> Result<CommandReply> {
    if ctx.params.len() < 8 {
        return Err(Error::ParseError("tree connect params too short".into()));
    }
    let password_len = read_u16_le(&ctx.params, 6)? as usize;
    if password_len > ctx.data.len() {
        return Err(Error::ParseError("tree connect password too long".into()));
    }
    let password = &ctx.data[..password_len];
    let share_password = if password.is_empty() || password == [0] {
        None
    } else {
        Some(String::from_utf8_lossy(password).trim_end_matches('\0').to_string())
    };

    let unicode = ctx.header.flags2.contains(Flags2::UNICODE);
    let mut pos = password_len;
    if unicode {
        pos += pad_to_align(ctx.data_offset as usize + pos, 2);
    }
    let (path, consumed) = if unicode {
        extract_unicode_string(&ctx.data, pos)?
    } else {
        extract_ascii_string(&ctx.data, pos)?
    };
    pos += consumed;
    let (service, _) = extract_ascii_string(&ctx.data, pos).unwrap_or_default();

    // \\server\share -> share
    let share_name = path.trim_end_matches('\\');
    let share_name = share_name.rsplit('\\').next().unwrap_or(share_name);
    debug!(path = %path, share = share_name, service = %service, "tree connect");

    let session = conn.session(ctx.header.uid)?.clone();
    let share = conn
        .server
        .share(share_name)
        .ok_or_else(|| Error::status(NtStatus::BadNetworkName, share_name.to_string()))?;

    let tree = share.connect(&session, share_password.as_deref()).await?;
    let named_pipe = share.is_named_pipe();
    let tid = conn.register_tree(share_name.to_string(), named_pipe, tree);

    let mut extra = Vec::with_capacity(2);
    extra.write_u16::<LittleEndian>(SMB_SUPPORT_SEARCH_BITS)?;

    let service = if named_pipe {
        SERVICE_NAMED_PIPE
    } else {
        SERVICE_DISK
    };
    let mut data = Vec::new();
    data.extend_from_slice(service.as_bytes());
    data.push(0);
    data.extend_from_slice(&unicode_bytes_nul("SMBGATE"));

    let mut body = ReplyBody::new(andx_reply_params(&extra), data);
    body.set_tid = Some(tid);
    Ok(CommandReply::Done(body))
}

pub async fn handle_disconnect(
    conn: &mut ConnectionHandler,
    ctx: CommandContext,
) -> Result<CommandReply> {
    match conn.remove_tree(ctx.header.tid) {
        Some(connected) => {
            debug!(tid = ctx.header.tid, share = %connected.share_name, "tree disconnect");
            connected.tree.disconnect().await;
            Ok(done_empty())
        }
        None => Err(Error::status(
            NtStatus::SmbBadTid,
            format!("tid {}", ctx.header.tid),
        )),
    }
}
