//! Virtual filesystem seam consumed by the command handlers
//!
//! A `Share` is connected per TREE_CONNECT_ANDX and yields a `Tree`; trees
//! own the FID space of their open `File`s. Backends decide what mutations
//! they support; read-only backends surface `STATUS_NOT_SUPPORTED` through
//! the error taxonomy.

pub mod memory;

use crate::auth::Session;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to an open or listed file.
pub type FileRef = Arc<dyn File>;

/// Shared handle to a connected tree.
pub type TreeRef = Arc<dyn Tree>;

/// A named share exported by the server.
#[async_trait]
pub trait Share: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Whether this share is a named pipe service rather than a disk tree.
    fn is_named_pipe(&self) -> bool;

    /// Connect a session to this share, producing a tree instance.
    async fn connect(&self, session: &Session, share_password: Option<&str>) -> Result<TreeRef>;
}

/// A connected tree; owns the FID table for its open files.
#[async_trait]
pub trait Tree: Send + Sync {
    /// Open an existing file or directory by share-relative path.
    async fn open(&self, name: &str) -> Result<FileRef>;

    /// Open or create according to an NT create disposition.
    async fn open_or_create(&self, name: &str, disposition: u32, directory: bool)
        -> Result<FileRef>;

    /// List files matching a wildcard pattern (`\dir\*.txt` style).
    async fn list(&self, pattern: &str) -> Result<Vec<FileRef>>;

    async fn create_file(&self, name: &str) -> Result<FileRef>;

    async fn create_directory(&self, name: &str) -> Result<FileRef>;

    async fn delete(&self, name: &str) -> Result<()>;

    async fn delete_directory(&self, name: &str) -> Result<()>;

    /// Rename an open file to a new share-relative path.
    async fn rename(&self, file: FileRef, new_path: &str) -> Result<()>;

    /// Resolve an open file by FID.
    fn get_file(&self, fid: u16) -> Option<FileRef>;

    /// Close and drop the file registered under `fid`.
    async fn close_file(&self, fid: u16) -> Result<()>;

    /// Tear down the tree: close every open file.
    async fn disconnect(&self);
}

/// An open file or directory.
#[async_trait]
pub trait File: Send + Sync {
    fn fid(&self) -> u16;
    fn name(&self) -> &str;
    /// Share-relative path, backslash separated, leading backslash.
    fn path(&self) -> &str;
    fn is_directory(&self) -> bool;
    fn size(&self) -> u64;
    fn allocation_size(&self) -> u64;

    /// Timestamps in epoch milliseconds.
    fn created(&self) -> u64;
    fn last_modified(&self) -> u64;
    fn last_changed(&self) -> u64;
    fn last_accessed(&self) -> u64;

    /// Extended file attribute bits for responses.
    fn attributes(&self) -> u32;

    /// The CreateAction recorded when this handle was produced.
    fn create_action(&self) -> u32;

    /// Read up to `buf.len()` bytes at `position`; returns bytes read.
    async fn read(&self, buf: &mut [u8], position: u64) -> Result<usize>;

    /// Write `data` at `position`; returns bytes written.
    async fn write(&self, data: &[u8], position: u64) -> Result<usize>;

    async fn set_length(&self, len: u64) -> Result<()>;

    async fn set_last_modified(&self, ms: u64) -> Result<()>;

    /// Mark the file for deletion when the last handle closes.
    fn set_delete_on_close(&self) -> Result<()>;

    async fn delete(&self) -> Result<()>;

    async fn flush(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Normalize a client path: backslash separators, single leading backslash,
/// no trailing backslash (except the root itself).
pub fn normalize_path(path: &str) -> String {
    let cleaned = path.replace('/', "\\");
    let trimmed = cleaned.trim_matches('\\');
    if trimmed.is_empty() {
        "\\".to_string()
    } else {
        format!("\\{}", trimmed)
    }
}

/// Parent directory of a normalized path (`\a\b` -> `\a`, `\a` -> `\`).
pub fn parent_of(path: &str) -> String {
    match path.rfind('\\') {
        Some(0) | None => "\\".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Final component of a normalized path.
pub fn leaf_of(path: &str) -> &str {
    match path.rfind('\\') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join a parent directory and a leaf name.
pub fn join_path(parent: &str, leaf: &str) -> String {
    if parent == "\\" {
        format!("\\{}", leaf)
    } else {
        format!("{}\\{}", parent, leaf)
    }
}

/// Case-insensitive DOS wildcard match: `*` spans any run, `?` one
/// character. `*.*` is the historical spelling of "everything".
pub fn matches_wildcard(pattern: &str, name: &str) -> bool {
    let pattern = if pattern == "*.*" { "*" } else { pattern };
    let p: Vec<char> = pattern.to_uppercase().chars().collect();
    let n: Vec<char> = name.to_uppercase().chars().collect();
    wildcard_inner(&p, &n)
}

fn wildcard_inner(pattern: &[char], name: &[char]) -> bool {
    match pattern.first() {
        None => name.is_empty(),
        Some('*') => {
            (0..=name.len()).any(|skip| wildcard_inner(&pattern[1..], &name[skip..]))
        }
        Some('?') => !name.is_empty() && wildcard_inner(&pattern[1..], &name[1..]),
        Some(c) => name.first() == Some(c) && wildcard_inner(&pattern[1..], &name[1..]),
    }
}
