//! SMB_COM_NT_CREATE_ANDX

use crate::error::{Error, Result};
use crate::protocol::constants::{
    create_options, file_status_flags, nt_create_flags, oplock_level, FILE_TYPE_DISK,
    FILE_TYPE_MESSAGEMODEPIPE,
};
use crate::server::connection::ConnectionHandler;
use crate::server::dispatcher::{CommandContext, CommandReply, ReplyBody};
use crate::server::handlers::andx_reply_params;
use crate::wire::{decode_unicode_bytes, pad_to_align, read_u16_le, read_u32_le, system_to_smb_time};
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

/// Word-count cap applied to oversized responses; Windows and Samba pin
/// the NT_CREATE_ANDX extended reply at 0x2a words even though more
/// parameter bytes follow.
const MAX_REPORTED_WORD_COUNT: u8 = 0x2A;

const MAXIMAL_ACCESS_RIGHTS: u32 = 0x001F_01FF;
const GUEST_MAXIMAL_ACCESS_RIGHTS: u32 = 0x001F_01FF;

pub async fn handle(conn: &mut ConnectionHandler, ctx: CommandContext) -> Result<CommandReply> {
    if ctx.params.len() < 48 {
        return Err(Error::ParseError("nt create params too short".into()));
    }

    let name_length = read_u16_le(&ctx.params, 5)? as usize;
    let flags = read_u32_le(&ctx.params, 7)?;
    let _root_directory_fid = read_u32_le(&ctx.params, 11)?;
    let _desired_access = read_u32_le(&ctx.params, 15)?;
    let _allocation_size = crate::wire::read_u64_le(&ctx.params, 19)?;
    let _ext_file_attributes = read_u32_le(&ctx.params, 27)?;
    let _share_access = read_u32_le(&ctx.params, 31)?;
    let disposition = read_u32_le(&ctx.params, 35)?;
    let options = read_u32_le(&ctx.params, 39)?;
    let _impersonation_level = read_u32_le(&ctx.params, 43)?;

    // Filename is 2-byte aligned relative to the header start
    let pos = pad_to_align(ctx.data_offset as usize, 2);
    if pos + name_length > ctx.data.len() {
        return Err(Error::ParseError("nt create name out of bounds".into()));
    }
    let name = decode_unicode_bytes(&ctx.data, pos, name_length)?;

    let directory = options & create_options::FILE_DIRECTORY_FILE != 0;
    debug!(name = %name, disposition, directory, "nt create");

    let connected = conn.tree(ctx.header.tid)?;
    let named_pipe = connected.named_pipe;
    let file = connected.tree.open_or_create(&name, disposition, directory).await?;

    if options & create_options::FILE_DELETE_ON_CLOSE != 0 {
        file.set_delete_on_close()?;
    }

    let oplock = if flags & nt_create_flags::REQUEST_OPBATCH != 0 {
        oplock_level::BATCH
    } else {
        oplock_level::NONE
    };
    let extended = flags & nt_create_flags::EXTENDED_RESPONSE != 0;

    let mut extra = Vec::with_capacity(96);
    extra.write_u8(oplock)?;
    extra.write_u16::<LittleEndian>(file.fid())?;
    extra.write_u32::<LittleEndian>(file.create_action())?;
    extra.write_u64::<LittleEndian>(system_to_smb_time(file.created() as i64))?;
    extra.write_u64::<LittleEndian>(system_to_smb_time(file.last_accessed() as i64))?;
    extra.write_u64::<LittleEndian>(system_to_smb_time(file.last_modified() as i64))?;
    extra.write_u64::<LittleEndian>(system_to_smb_time(file.last_changed() as i64))?;
    extra.write_u32::<LittleEndian>(file.attributes())?;
    extra.write_u64::<LittleEndian>(file.allocation_size())?;
    extra.write_u64::<LittleEndian>(file.size())?;
    extra.write_u16::<LittleEndian>(if named_pipe {
        FILE_TYPE_MESSAGEMODEPIPE
    } else {
        FILE_TYPE_DISK
    })?;

    if extended {
        extra.write_u16::<LittleEndian>(
            file_status_flags::NO_EAS
                | file_status_flags::NO_SUBSTREAMS
                | file_status_flags::NO_REPARSETAG,
        )?;
        extra.write_u8(file.is_directory() as u8)?;
        extra.extend_from_slice(&[0u8; 16]); // volume GUID
        extra.write_u64::<LittleEndian>(0)?; // file id
        extra.write_u32::<LittleEndian>(MAXIMAL_ACCESS_RIGHTS)?;
        extra.write_u32::<LittleEndian>(GUEST_MAXIMAL_ACCESS_RIGHTS)?;
    } else {
        extra.write_u16::<LittleEndian>(0)?; // NMPipeStatus
        extra.write_u8(file.is_directory() as u8)?;
    }

    let params = andx_reply_params(&extra);
    let derived = (params.len() / 2) as u8;
    let mut body = ReplyBody::new(params, Vec::new());
    if derived > MAX_REPORTED_WORD_COUNT {
        body.word_count = Some(MAX_REPORTED_WORD_COUNT);
    }
    Ok(CommandReply::Done(body))
}
