//! Path-addressed operations: DELETE, RENAME, directory commands
//!
//! These pre-NT commands carry `0x04`-prefixed pathnames in the data block,
//! 2-byte aligned relative to the header when unicode is in effect.

use crate::error::{Error, Result};
use crate::protocol::header::Flags2;
use crate::server::connection::ConnectionHandler;
use crate::server::dispatcher::{CommandContext, CommandReply};
use crate::server::handlers::done_empty;
use crate::vfs::TreeRef;
use crate::wire::{extract_ascii_string, extract_unicode_string, pad_to_align};
use crate::NtStatus;
use std::sync::Arc;
use tracing::debug;

const BUFFER_FORMAT_PATHNAME: u8 = 0x04;

/// Read one `0x04`-prefixed pathname at `pos`; returns the path and the
/// position after it.
fn take_pathname(ctx: &CommandContext, pos: usize) -> Result<(String, usize)> {
    if ctx.data.get(pos) != Some(&BUFFER_FORMAT_PATHNAME) {
        return Err(Error::ParseError("expected pathname buffer format".into()));
    }
    let mut pos = pos + 1;
    if ctx.header.flags2.contains(Flags2::UNICODE) {
        pos += pad_to_align(ctx.data_offset as usize + pos, 2);
        let (path, consumed) = extract_unicode_string(&ctx.data, pos)?;
        Ok((path, pos + consumed))
    } else {
        let (path, consumed) = extract_ascii_string(&ctx.data, pos)?;
        Ok((path, pos + consumed))
    }
}

fn tree_of(conn: &ConnectionHandler, ctx: &CommandContext) -> Result<TreeRef> {
    Ok(Arc::clone(&conn.tree(ctx.header.tid)?.tree))
}

pub async fn handle_delete(conn: &mut ConnectionHandler, ctx: CommandContext) -> Result<CommandReply> {
    let tree = tree_of(conn, &ctx)?;
    let (pattern, _) = take_pathname(&ctx, 0)?;
    debug!(pattern = %pattern, "delete");

    let matches = tree.list(&pattern).await?;
    let files: Vec<_> = matches.into_iter().filter(|f| !f.is_directory()).collect();
    if files.is_empty() {
        return Err(Error::status(NtStatus::NoSuchFile, pattern));
    }
    for file in files {
        file.delete().await?;
    }
    Ok(done_empty())
}

pub async fn handle_rename(conn: &mut ConnectionHandler, ctx: CommandContext) -> Result<CommandReply> {
    let tree = tree_of(conn, &ctx)?;
    let (old_path, next) = take_pathname(&ctx, 0)?;
    let (new_path, _) = take_pathname(&ctx, next)?;
    debug!(old_path = %old_path, new_path = %new_path, "rename");

    let matches = tree.list(&old_path).await?;
    let file = matches
        .into_iter()
        .next()
        .ok_or_else(|| Error::status(NtStatus::NoSuchFile, old_path))?;
    tree.rename(file, &new_path).await?;
    Ok(done_empty())
}

pub async fn handle_create_directory(
    conn: &mut ConnectionHandler,
    ctx: CommandContext,
) -> Result<CommandReply> {
    let tree = tree_of(conn, &ctx)?;
    let (path, _) = take_pathname(&ctx, 0)?;
    debug!(path = %path, "create directory");
    tree.create_directory(&path).await?;
    Ok(done_empty())
}

pub async fn handle_delete_directory(
    conn: &mut ConnectionHandler,
    ctx: CommandContext,
) -> Result<CommandReply> {
    let tree = tree_of(conn, &ctx)?;
    let (path, _) = take_pathname(&ctx, 0)?;
    debug!(path = %path, "delete directory");
    tree.delete_directory(&path).await?;
    Ok(done_empty())
}

pub async fn handle_check_directory(
    conn: &mut ConnectionHandler,
    ctx: CommandContext,
) -> Result<CommandReply> {
    let tree = tree_of(conn, &ctx)?;
    let (path, _) = take_pathname(&ctx, 0)?;

    if path.is_empty() || path == "\\" {
        return Ok(done_empty());
    }
    let matches = tree.list(&path).await?;
    let file = matches
        .into_iter()
        .next()
        .ok_or_else(|| Error::status(NtStatus::ObjectNameNotFound, path.clone()))?;
    if !file.is_directory() {
        return Err(Error::status(NtStatus::NotADirectory, path));
    }
    Ok(done_empty())
}
