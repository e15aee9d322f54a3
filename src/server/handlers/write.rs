//! SMB_COM_WRITE_ANDX

use crate::error::{Error, Result};
use crate::server::connection::ConnectionHandler;
use crate::server::dispatcher::{CommandContext, CommandReply};
use crate::server::handlers::{andx_reply_params, done};
use crate::wire::{read_u16_le, read_u32_le};
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::trace;

pub async fn handle(conn: &mut ConnectionHandler, ctx: CommandContext) -> Result<CommandReply> {
    if ctx.params.len() < 24 {
        return Err(Error::ParseError("write params too short".into()));
    }
    let fid = read_u16_le(&ctx.params, 4)?;
    let offset_low = read_u32_le(&ctx.params, 6)? as u64;
    let _timeout = read_u32_le(&ctx.params, 10)?;
    let _write_mode = read_u16_le(&ctx.params, 14)?;
    let _remaining = read_u16_le(&ctx.params, 16)?;
    let length_high = read_u16_le(&ctx.params, 18)? as usize;
    let length_low = read_u16_le(&ctx.params, 20)? as usize;
    let data_offset = read_u16_le(&ctx.params, 22)? as usize;
    let offset_high = if ctx.params.len() >= 28 {
        read_u32_le(&ctx.params, 24)? as u64
    } else {
        0
    };
    let offset = offset_low | (offset_high << 32);
    let length = length_low | (length_high << 16);

    // DataOffset is absolute from the header start
    let start = data_offset
        .checked_sub(ctx.data_offset as usize)
        .ok_or_else(|| Error::ParseError("write data offset before data block".into()))?;
    if start + length > ctx.data.len() {
        return Err(Error::ParseError("write data out of bounds".into()));
    }
    let payload = &ctx.data[start..start + length];

    let file = conn.file(ctx.header.tid, fid)?;
    let written = file.write(payload, offset).await?;
    trace!(fid, offset, written, "write");

    let mut extra = Vec::with_capacity(8);
    extra.write_u16::<LittleEndian>((written & 0xFFFF) as u16)?;
    extra.write_u16::<LittleEndian>(0)?; // available
    extra.write_u16::<LittleEndian>((written >> 16) as u16)?; // count high
    extra.write_u16::<LittleEndian>(0)?; // reserved

    Ok(done(andx_reply_params(&extra), Vec::new()))
}
