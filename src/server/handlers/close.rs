//! SMB_COM_CLOSE and SMB_COM_FLUSH

use crate::error::{Error, Result};
use crate::server::connection::ConnectionHandler;
use crate::server::dispatcher::{CommandContext, CommandReply};
use crate::server::handlers::done_empty;
use crate::wire::{read_u16_le, read_u32_le};
use crate::NtStatus;
use tracing::{debug, trace};

/// FID wildcard in FLUSH: flush everything on the tree.
const FLUSH_ALL_FID: u16 = 0xFFFF;

pub async fn handle(conn: &mut ConnectionHandler, ctx: CommandContext) -> Result<CommandReply> {
    if ctx.params.len() < 6 {
        return Err(Error::ParseError("close params too short".into()));
    }
    let fid = read_u16_le(&ctx.params, 0)?;
    let last_time_modified = read_u32_le(&ctx.params, 2)?;

    let file = conn.file(ctx.header.tid, fid)?;

    // A UTIME of 0 or -1 means "leave the mtime alone"
    if last_time_modified != 0 && last_time_modified != 0xFFFF_FFFF {
        let ms = last_time_modified as u64 * 1000;
        if let Err(e) = file.set_last_modified(ms).await {
            // Read-only backends cannot honour the stamp; the close itself
            // still succeeds.
            if e.nt_status() == NtStatus::NotSupported {
                debug!(fid, "ignoring close mtime on read-only file");
            } else {
                return Err(e);
            }
        }
    }

    conn.tree(ctx.header.tid)?.tree.close_file(fid).await?;
    trace!(fid, "closed");
    Ok(done_empty())
}

pub async fn handle_flush(conn: &mut ConnectionHandler, ctx: CommandContext) -> Result<CommandReply> {
    if ctx.params.len() < 2 {
        return Err(Error::ParseError("flush params too short".into()));
    }
    let fid = read_u16_le(&ctx.params, 0)?;

    if fid == FLUSH_ALL_FID {
        // Writes are committed synchronously; a full flush is a no-op
        conn.tree(ctx.header.tid)?;
    } else {
        conn.file(ctx.header.tid, fid)?.flush().await?;
    }
    Ok(done_empty())
}
