//! SMB_COM_TRANSACTION2 and its subcommand dispatch
//!
//! FIND_FIRST2/FIND_NEXT2 directory searches, filesystem and file
//! information queries, and the NT pass-through SET_FILE_INFORMATION
//! levels. Subcommands resolve through a second-level static table on the
//! same pattern as the top-level registry. Error replies always carry
//! empty Trans2 parameter blocks.

use crate::error::{Error, Result};
use crate::protocol::constants::{find_flags, info_level, trans2};
use crate::protocol::header::SmbHeader;
use crate::server::connection::{ConnectionHandler, SearchState};
use crate::server::dispatcher::{CommandContext, CommandReply, ReplyBody};
use crate::server::handlers::done_empty;
use crate::vfs::{join_path, parent_of, FileRef};
use crate::wire::{
    extract_unicode_string, pad_to_align, read_u16_le, read_u32_le, read_u64_le,
    system_to_smb_time, unicode_bytes,
};
use crate::NtStatus;
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::{debug, trace};

/// A parsed TRANSACTION2 request.
struct Trans2Request {
    subcommand: u16,
    params: Vec<u8>,
    data: Vec<u8>,
}

impl Trans2Request {
    fn parse(ctx: &CommandContext) -> Result<Self> {
        if ctx.params.len() < 30 {
            return Err(Error::ParseError("trans2 params too short".into()));
        }
        let param_count = read_u16_le(&ctx.params, 18)? as usize;
        let param_offset = read_u16_le(&ctx.params, 20)? as usize;
        let data_count = read_u16_le(&ctx.params, 22)? as usize;
        let data_offset = read_u16_le(&ctx.params, 24)? as usize;
        let setup_count = ctx.params[26] as usize;
        if setup_count < 1 {
            return Err(Error::ParseError("trans2 without subcommand".into()));
        }
        let subcommand = read_u16_le(&ctx.params, 28)?;

        let slice_at = |offset: usize, count: usize| -> Result<Vec<u8>> {
            if count == 0 {
                return Ok(Vec::new());
            }
            let start = offset
                .checked_sub(ctx.data_offset as usize)
                .ok_or_else(|| Error::ParseError("trans2 block before data".into()))?;
            if start + count > ctx.data.len() {
                return Err(Error::ParseError("trans2 block out of bounds".into()));
            }
            Ok(ctx.data[start..start + count].to_vec())
        };

        Ok(Self {
            subcommand,
            params: slice_at(param_offset, param_count)?,
            data: slice_at(data_offset, data_count)?,
        })
    }
}

/// A Trans2 response body before final layout.
struct Trans2Reply {
    params: Vec<u8>,
    data: Vec<u8>,
}

/// Lay a Trans2 reply out on the wire: 10 parameter words, then the
/// 4-byte-aligned parameter and data blocks with absolute offsets.
fn build_reply(t2: Trans2Reply) -> Result<CommandReply> {
    let base = SmbHeader::SIZE + 1 + 20 + 2;
    let pad1 = pad_to_align(base, 4);
    let param_offset = base + pad1;
    let pad2 = pad_to_align(param_offset + t2.params.len(), 4);
    let data_offset = param_offset + t2.params.len() + pad2;

    let mut params = Vec::with_capacity(20);
    params.write_u16::<LittleEndian>(t2.params.len() as u16)?;
    params.write_u16::<LittleEndian>(t2.data.len() as u16)?;
    params.write_u16::<LittleEndian>(0)?; // reserved
    params.write_u16::<LittleEndian>(t2.params.len() as u16)?;
    params.write_u16::<LittleEndian>(param_offset as u16)?;
    params.write_u16::<LittleEndian>(0)?; // parameter displacement
    params.write_u16::<LittleEndian>(t2.data.len() as u16)?;
    params.write_u16::<LittleEndian>(data_offset as u16)?;
    params.write_u16::<LittleEndian>(0)?; // data displacement
    params.write_u8(0)?; // setup count
    params.write_u8(0)?; // reserved

    let mut data = Vec::with_capacity(pad1 + t2.params.len() + pad2 + t2.data.len());
    data.extend(std::iter::repeat(0u8).take(pad1));
    data.extend_from_slice(&t2.params);
    data.extend(std::iter::repeat(0u8).take(pad2));
    data.extend_from_slice(&t2.data);

    Ok(CommandReply::Done(ReplyBody::new(params, data)))
}

pub async fn handle(conn: &mut ConnectionHandler, ctx: CommandContext) -> Result<CommandReply> {
    let req = Trans2Request::parse(&ctx)?;
    trace!(subcommand = format_args!("{:#06x}", req.subcommand), "trans2");

    let reply = match req.subcommand {
        trans2::FIND_FIRST2 => find_first2(conn, &ctx, &req).await?,
        trans2::FIND_NEXT2 => find_next2(conn, &ctx, &req).await?,
        trans2::QUERY_FS_INFORMATION => query_fs_information(conn, &ctx, &req).await?,
        trans2::QUERY_PATH_INFORMATION => query_path_information(conn, &ctx, &req).await?,
        trans2::QUERY_FILE_INFORMATION => query_file_information(conn, &ctx, &req).await?,
        trans2::SET_FILE_INFORMATION => set_file_information(conn, &ctx, &req).await?,
        other => {
            return Err(Error::status(
                NtStatus::NotImplemented,
                format!("trans2 subcommand {:#06x}", other),
            ))
        }
    };
    build_reply(reply)
}

pub async fn handle_find_close2(
    conn: &mut ConnectionHandler,
    ctx: CommandContext,
) -> Result<CommandReply> {
    let sid = read_u16_le(&ctx.params, 0)?;
    conn.end_search(sid);
    Ok(done_empty())
}

// --- directory search ---

async fn find_first2(
    conn: &mut ConnectionHandler,
    ctx: &CommandContext,
    req: &Trans2Request,
) -> Result<Trans2Reply> {
    if req.params.len() < 12 {
        return Err(Error::ParseError("find_first2 params too short".into()));
    }
    let _search_attributes = read_u16_le(&req.params, 0)?;
    let search_count = read_u16_le(&req.params, 2)? as usize;
    let flags = read_u16_le(&req.params, 4)?;
    let level = read_u16_le(&req.params, 6)?;
    let (pattern, _) = extract_unicode_string(&req.params, 12)?;

    if level != info_level::FIND_FILE_BOTH_DIRECTORY_INFO {
        return Err(Error::status(
            NtStatus::NotSupported,
            format!("find information level {:#06x}", level),
        ));
    }

    let tree = std::sync::Arc::clone(&conn.tree(ctx.header.tid)?.tree);
    let entries = tree.list(&pattern).await?;
    debug!(pattern = %pattern, matched = entries.len(), "find first");
    if entries.is_empty() {
        return Err(Error::status(NtStatus::NoSuchFile, pattern));
    }

    let batch = search_count.max(1).min(entries.len());
    let data = encode_both_directory_info(&entries[..batch])?;
    let end_of_search = batch == entries.len();

    let close_now = flags & find_flags::CLOSE_AFTER_REQUEST != 0
        || (end_of_search && flags & find_flags::CLOSE_AT_END_OF_SEARCH != 0);
    let sid = if end_of_search || close_now {
        0
    } else {
        conn.register_search(SearchState {
            entries,
            next: batch,
            close_at_end: flags & find_flags::CLOSE_AT_END_OF_SEARCH != 0,
        })
    };

    let mut params = Vec::with_capacity(10);
    params.write_u16::<LittleEndian>(sid)?;
    params.write_u16::<LittleEndian>(batch as u16)?;
    params.write_u16::<LittleEndian>(end_of_search as u16)?;
    params.write_u16::<LittleEndian>(0)?; // EA error offset
    params.write_u16::<LittleEndian>(0)?; // last name offset
    Ok(Trans2Reply { params, data })
}

async fn find_next2(
    conn: &mut ConnectionHandler,
    _ctx: &CommandContext,
    req: &Trans2Request,
) -> Result<Trans2Reply> {
    if req.params.len() < 12 {
        return Err(Error::ParseError("find_next2 params too short".into()));
    }
    let sid = read_u16_le(&req.params, 0)?;
    let search_count = read_u16_le(&req.params, 2)? as usize;
    let level = read_u16_le(&req.params, 4)?;
    let flags = read_u16_le(&req.params, 10)?;

    if level != info_level::FIND_FILE_BOTH_DIRECTORY_INFO {
        return Err(Error::status(
            NtStatus::NotSupported,
            format!("find information level {:#06x}", level),
        ));
    }

    let (data, batch, end_of_search) = {
        let search = conn
            .search_mut(sid)
            .ok_or_else(|| Error::status(NtStatus::InvalidHandle, format!("sid {}", sid)))?;
        let remaining = search.entries.len() - search.next;
        let batch = search_count.max(1).min(remaining);
        let slice = &search.entries[search.next..search.next + batch];
        let data = encode_both_directory_info(slice)?;
        search.next += batch;
        (data, batch, search.next == search.entries.len())
    };

    let close_now = flags & find_flags::CLOSE_AFTER_REQUEST != 0
        || (end_of_search
            && conn
                .search_mut(sid)
                .map(|search| search.close_at_end)
                .unwrap_or(false));
    if close_now || end_of_search {
        conn.end_search(sid);
    }

    let mut params = Vec::with_capacity(8);
    params.write_u16::<LittleEndian>(batch as u16)?;
    params.write_u16::<LittleEndian>(end_of_search as u16)?;
    params.write_u16::<LittleEndian>(0)?; // EA error offset
    params.write_u16::<LittleEndian>(0)?; // last name offset
    Ok(Trans2Reply {
        params,
        data,
    })
}

/// SMB_FIND_FILE_BOTH_DIRECTORY_INFO entry list, each entry padded to a
/// 4-byte boundary and linked by NextEntryOffset.
fn encode_both_directory_info(entries: &[FileRef]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    for (index, file) in entries.iter().enumerate() {
        let name = unicode_bytes(file.name());
        let fixed_len = 94 + name.len();
        let padded_len = fixed_len + pad_to_align(fixed_len, 4);
        let next_offset = if index + 1 == entries.len() {
            0
        } else {
            padded_len as u32
        };

        let mut entry = Vec::with_capacity(padded_len);
        entry.write_u32::<LittleEndian>(next_offset)?;
        entry.write_u32::<LittleEndian>(0)?; // file index
        entry.write_u64::<LittleEndian>(system_to_smb_time(file.created() as i64))?;
        entry.write_u64::<LittleEndian>(system_to_smb_time(file.last_accessed() as i64))?;
        entry.write_u64::<LittleEndian>(system_to_smb_time(file.last_modified() as i64))?;
        entry.write_u64::<LittleEndian>(system_to_smb_time(file.last_changed() as i64))?;
        entry.write_u64::<LittleEndian>(file.size())?;
        entry.write_u64::<LittleEndian>(file.allocation_size())?;
        entry.write_u32::<LittleEndian>(file.attributes())?;
        entry.write_u32::<LittleEndian>(name.len() as u32)?;
        entry.write_u32::<LittleEndian>(0)?; // EA size
        entry.write_u8(0)?; // short name length
        entry.write_u8(0)?; // reserved
        entry.extend_from_slice(&[0u8; 24]); // short name
        entry.extend_from_slice(&name);
        entry.resize(padded_len, 0);
        data.extend_from_slice(&entry);
    }
    Ok(data)
}

// --- information queries ---

async fn query_fs_information(
    conn: &mut ConnectionHandler,
    ctx: &CommandContext,
    req: &Trans2Request,
) -> Result<Trans2Reply> {
    let level = read_u16_le(&req.params, 0)?;
    let share_name = conn.tree(ctx.header.tid)?.share_name.clone();

    let data = match level {
        info_level::QUERY_FS_VOLUME_INFO => {
            let label = unicode_bytes(&share_name);
            let mut data = Vec::new();
            data.write_u64::<LittleEndian>(0)?; // volume creation time
            data.write_u32::<LittleEndian>(0x5347_4154)?; // serial number
            data.write_u32::<LittleEndian>(label.len() as u32)?;
            data.write_u16::<LittleEndian>(0)?; // reserved
            data.extend_from_slice(&label);
            data
        }
        info_level::QUERY_FS_SIZE_INFO => {
            let mut data = Vec::new();
            data.write_u64::<LittleEndian>(0x0100_0000)?; // total units
            data.write_u64::<LittleEndian>(0)?; // free units
            data.write_u32::<LittleEndian>(8)?; // sectors per unit
            data.write_u32::<LittleEndian>(512)?; // bytes per sector
            data
        }
        info_level::QUERY_FS_DEVICE_INFO => {
            let mut data = Vec::new();
            data.write_u32::<LittleEndian>(0x0000_0007)?; // FILE_DEVICE_DISK
            data.write_u32::<LittleEndian>(0)?; // characteristics
            data
        }
        info_level::QUERY_FS_ATTRIBUTE_INFO => {
            const FILE_CASE_PRESERVED_NAMES: u32 = 0x0000_0002;
            const FILE_UNICODE_ON_DISK: u32 = 0x0000_0004;
            let fs_name = unicode_bytes("NTFS");
            let mut data = Vec::new();
            data.write_u32::<LittleEndian>(FILE_CASE_PRESERVED_NAMES | FILE_UNICODE_ON_DISK)?;
            data.write_u32::<LittleEndian>(255)?; // max component length
            data.write_u32::<LittleEndian>(fs_name.len() as u32)?;
            data.extend_from_slice(&fs_name);
            data
        }
        other => {
            return Err(Error::status(
                NtStatus::NotSupported,
                format!("query fs level {:#06x}", other),
            ))
        }
    };

    Ok(Trans2Reply {
        params: Vec::new(),
        data,
    })
}

async fn query_path_information(
    conn: &mut ConnectionHandler,
    ctx: &CommandContext,
    req: &Trans2Request,
) -> Result<Trans2Reply> {
    if req.params.len() < 6 {
        return Err(Error::ParseError("query path params too short".into()));
    }
    let level = read_u16_le(&req.params, 0)?;
    let (path, _) = extract_unicode_string(&req.params, 6)?;
    debug!(path = %path, level = format_args!("{:#06x}", level), "query path information");

    let tree = std::sync::Arc::clone(&conn.tree(ctx.header.tid)?.tree);
    let file = tree.open(&path).await?;
    let info = encode_file_info(level, &file);
    tree.close_file(file.fid()).await?;

    Ok(Trans2Reply {
        params: vec![0, 0], // EA error offset
        data: info?,
    })
}

async fn query_file_information(
    conn: &mut ConnectionHandler,
    ctx: &CommandContext,
    req: &Trans2Request,
) -> Result<Trans2Reply> {
    if req.params.len() < 4 {
        return Err(Error::ParseError("query file params too short".into()));
    }
    let fid = read_u16_le(&req.params, 0)?;
    let level = read_u16_le(&req.params, 2)?;

    let file = conn.file(ctx.header.tid, fid)?;
    Ok(Trans2Reply {
        params: vec![0, 0],
        data: encode_file_info(level, &file)?,
    })
}

fn encode_file_info(level: u16, file: &FileRef) -> Result<Vec<u8>> {
    match level {
        info_level::QUERY_FILE_BASIC_INFO => basic_info(file),
        info_level::QUERY_FILE_STANDARD_INFO => standard_info(file),
        info_level::QUERY_FILE_ALL_INFO => all_info(file),
        _ if level >= info_level::INFO_PASSTHROUGH => {
            match level - info_level::INFO_PASSTHROUGH {
                info_level::FILE_BASIC_INFORMATION => basic_info(file),
                info_level::FILE_STANDARD_INFORMATION => standard_info(file),
                other => Err(Error::status(
                    NtStatus::NotImplemented,
                    format!("pass-through query class {}", other),
                )),
            }
        }
        other => Err(Error::status(
            NtStatus::NotSupported,
            format!("query information level {:#06x}", other),
        )),
    }
}

fn basic_info(file: &FileRef) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(40);
    data.write_u64::<LittleEndian>(system_to_smb_time(file.created() as i64))?;
    data.write_u64::<LittleEndian>(system_to_smb_time(file.last_accessed() as i64))?;
    data.write_u64::<LittleEndian>(system_to_smb_time(file.last_modified() as i64))?;
    data.write_u64::<LittleEndian>(system_to_smb_time(file.last_changed() as i64))?;
    data.write_u32::<LittleEndian>(file.attributes())?;
    data.write_u32::<LittleEndian>(0)?; // reserved
    Ok(data)
}

fn standard_info(file: &FileRef) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(22);
    data.write_u64::<LittleEndian>(file.allocation_size())?;
    data.write_u64::<LittleEndian>(file.size())?;
    data.write_u32::<LittleEndian>(1)?; // number of links
    data.write_u8(0)?; // delete pending
    data.write_u8(file.is_directory() as u8)?;
    Ok(data)
}

fn all_info(file: &FileRef) -> Result<Vec<u8>> {
    let name = unicode_bytes(file.path());
    let mut data = basic_info(file)?;
    data.write_u64::<LittleEndian>(file.allocation_size())?;
    data.write_u64::<LittleEndian>(file.size())?;
    data.write_u32::<LittleEndian>(1)?; // number of links
    data.write_u8(0)?; // delete pending
    data.write_u8(file.is_directory() as u8)?;
    data.write_u16::<LittleEndian>(0)?; // reserved
    data.write_u32::<LittleEndian>(0)?; // EA size
    data.write_u32::<LittleEndian>(name.len() as u32)?;
    data.extend_from_slice(&name);
    Ok(data)
}

// --- information setters ---

async fn set_file_information(
    conn: &mut ConnectionHandler,
    ctx: &CommandContext,
    req: &Trans2Request,
) -> Result<Trans2Reply> {
    if req.params.len() < 4 {
        return Err(Error::ParseError("set file params too short".into()));
    }
    let fid = read_u16_le(&req.params, 0)?;
    let level = read_u16_le(&req.params, 2)?;

    if level < info_level::INFO_PASSTHROUGH {
        return Err(Error::status(
            NtStatus::NotSupported,
            format!("set information level {:#06x}", level),
        ));
    }

    let file = conn.file(ctx.header.tid, fid)?;
    let class = level - info_level::INFO_PASSTHROUGH;
    debug!(fid, class, "set file information");

    match class {
        info_level::FILE_DISPOSITION_INFORMATION => {
            let dispose = *req.data.first().ok_or_else(|| {
                Error::ParseError("disposition information without payload".into())
            })?;
            if dispose != 0 {
                file.set_delete_on_close()?;
            }
        }
        info_level::FILE_END_OF_FILE_INFORMATION => {
            let length = read_u64_le(&req.data, 0)?;
            file.set_length(length).await?;
        }
        info_level::FILE_ALLOCATION_INFORMATION => {
            let allocation = read_u64_le(&req.data, 0)?;
            if allocation == 0 && file.size() > 0 {
                file.set_length(0).await?;
            }
            // Non-zero allocation on a non-empty file is acknowledged
            // without changing anything.
        }
        info_level::FILE_RENAME_INFORMATION => {
            if req.data.len() < 12 {
                return Err(Error::ParseError("rename information too short".into()));
            }
            let _replace_if_exists = req.data[0];
            let name_length = read_u32_le(&req.data, 8)? as usize;
            if 12 + name_length > req.data.len() {
                return Err(Error::ParseError("rename target out of bounds".into()));
            }
            let target = crate::wire::decode_unicode_bytes(&req.data, 12, name_length)?;
            let new_path = join_path(&parent_of(file.path()), &target);
            let tree = std::sync::Arc::clone(&conn.tree(ctx.header.tid)?.tree);
            tree.rename(file, &new_path).await?;
        }
        other => {
            return Err(Error::status(
                NtStatus::NotImplemented,
                format!("pass-through set class {}", other),
            ))
        }
    }

    Ok(Trans2Reply {
        params: vec![0, 0], // EA error offset
        data: Vec::new(),
    })
}
