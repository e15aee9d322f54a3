//! SMB_COM_READ_ANDX

use crate::error::{Error, Result};
use crate::protocol::constants::READ_ANDX_DATA_OFFSET;
use crate::server::connection::ConnectionHandler;
use crate::server::dispatcher::{CommandContext, CommandReply};
use crate::server::handlers::{andx_reply_params, done};
use crate::wire::{read_u16_le, read_u32_le};
use crate::NtStatus;
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::trace;

/// Upper bound on a single large read.
const MAX_READ: usize = 65536;

pub async fn handle(conn: &mut ConnectionHandler, ctx: CommandContext) -> Result<CommandReply> {
    if ctx.params.len() < 20 {
        return Err(Error::ParseError("read params too short".into()));
    }
    let fid = read_u16_le(&ctx.params, 4)?;
    let offset_low = read_u32_le(&ctx.params, 6)? as u64;
    let max_count = read_u16_le(&ctx.params, 10)? as usize;
    let _min_count = read_u16_le(&ctx.params, 12)?;
    let timeout_or_high = read_u32_le(&ctx.params, 14)?;
    // With word count 12 the request carries the upper offset half
    let offset_high = if ctx.params.len() >= 24 {
        read_u32_le(&ctx.params, 20)? as u64
    } else {
        0
    };
    let offset = offset_low | (offset_high << 32);

    let named_pipe = conn.tree(ctx.header.tid)?.named_pipe;
    // For disk shares the timeout field doubles as the count's high 16 bits
    let max_count = if named_pipe {
        max_count
    } else {
        max_count | (((timeout_or_high & 0xFFFF) as usize) << 16)
    };
    let max_count = max_count.min(MAX_READ);

    let file = conn.file(ctx.header.tid, fid)?;
    if file.is_directory() {
        return Err(Error::status(NtStatus::FileIsADirectory, file.path().to_string()));
    }

    let mut buf = vec![0u8; max_count];
    let n = file.read(&mut buf, offset).await?;
    buf.truncate(n);
    trace!(fid, offset, requested = max_count, read = n, "read");

    let mut extra = Vec::with_capacity(20);
    extra.write_u16::<LittleEndian>(0)?; // available (files: 0)
    extra.write_u16::<LittleEndian>(0)?; // data compaction mode
    extra.write_u16::<LittleEndian>(0)?; // reserved
    extra.write_u16::<LittleEndian>((n & 0xFFFF) as u16)?;
    extra.write_u16::<LittleEndian>(READ_ANDX_DATA_OFFSET)?;
    extra.write_u16::<LittleEndian>((n >> 16) as u16)?; // data length high
    extra.extend_from_slice(&[0u8; 8]); // reserved

    let mut data = Vec::with_capacity(1 + n);
    data.push(0); // pad so the payload lands at DataOffset
    data.extend_from_slice(&buf);

    Ok(done(andx_reply_params(&extra), data))
}
