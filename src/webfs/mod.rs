//! HTTP-backed read-only share
//!
//! Projects an HTTP-addressable content source as a browsable SMB share.
//! The tree is described by a manifest (paths, URLs, sizes, timestamps);
//! directories are derived from the file paths. File bytes are fetched on
//! demand through a [`Rectifier`] issuing one ranged GET per open file,
//! created lazily at the first read so that opens without reads cost no
//! HTTP traffic.
//!
//! Every mutation surfaces `STATUS_NOT_SUPPORTED`.

use crate::auth::Session;
use crate::error::{Error, Result};
use crate::protocol::constants::{create_action, create_disposition, file_attributes};
use crate::rectifier::Rectifier;
use crate::vfs::{
    leaf_of, matches_wildcard, normalize_path, parent_of, File, FileRef, Share, Tree, TreeRef,
};
use crate::NtStatus;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// One remote file in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Share-relative path, `/` or `\` separated.
    pub path: String,
    /// Absolute URL the bytes are fetched from.
    pub url: String,
    pub size: u64,
    #[serde(default)]
    pub created_ms: u64,
    #[serde(default)]
    pub modified_ms: u64,
}

/// Manifest describing a whole share.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareManifest {
    pub files: Vec<ManifestEntry>,
    /// Extra request headers sent to the origin (auth tokens and the like).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ShareManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidParameter(format!("manifest parse error: {}", e)))
    }
}

#[derive(Debug, Clone)]
enum RemoteNode {
    Directory,
    File(ManifestEntry),
}

struct ShareState {
    nodes: BTreeMap<String, RemoteNode>,
    headers: HeaderMap,
    client: reqwest::Client,
    /// Open handles per path, maintained by the owning connection.
    open_counts: Mutex<HashMap<String, usize>>,
}

impl ShareState {
    fn adjust_open_count(&self, path: &str, delta: isize) {
        let mut counts = self
            .open_counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = counts.entry(path.to_string()).or_insert(0);
        *count = (*count as isize + delta).max(0) as usize;
        if *count == 0 {
            counts.remove(path);
        }
    }
}

/// A read-only share backed by HTTP content.
pub struct WebShare {
    name: String,
    description: String,
    state: Arc<ShareState>,
}

impl WebShare {
    pub fn new(name: &str, manifest: ShareManifest) -> Result<Self> {
        Self::with_client(name, manifest, reqwest::Client::new())
    }

    pub fn with_client(name: &str, manifest: ShareManifest, client: reqwest::Client) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (key, value) in &manifest.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| Error::InvalidParameter(format!("header name {}: {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidParameter(format!("header value for {}: {}", key, e)))?;
            headers.insert(name, value);
        }

        let mut nodes = BTreeMap::new();
        nodes.insert("\\".to_string(), RemoteNode::Directory);
        for entry in manifest.files {
            let path = normalize_path(&entry.path);
            let mut dir = parent_of(&path);
            while dir != "\\" {
                nodes.entry(dir.clone()).or_insert(RemoteNode::Directory);
                dir = parent_of(&dir);
            }
            nodes.insert(path, RemoteNode::File(entry));
        }
        info!(share = name, entries = nodes.len() - 1, "web share loaded");

        Ok(Self {
            name: name.to_string(),
            description: "HTTP content share".to_string(),
            state: Arc::new(ShareState {
                nodes,
                headers,
                client,
                open_counts: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Open handle count for a path; used by teardown bookkeeping.
    pub fn open_count(&self, path: &str) -> usize {
        self.state
            .open_counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&normalize_path(path))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Share for WebShare {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_named_pipe(&self) -> bool {
        false
    }

    async fn connect(&self, session: &Session, _share_password: Option<&str>) -> Result<TreeRef> {
        debug!(share = %self.name, account = %session.account, "tree connect");
        Ok(Arc::new(WebTree {
            state: Arc::clone(&self.state),
            open: Mutex::new(HashMap::new()),
            next_fid: AtomicU16::new(1),
        }))
    }
}

/// A connected view of a [`WebShare`].
pub struct WebTree {
    state: Arc<ShareState>,
    open: Mutex<HashMap<u16, FileRef>>,
    next_fid: AtomicU16,
}

impl WebTree {
    fn make_file(&self, path: String, register: bool) -> Result<FileRef> {
        let node = self
            .state
            .nodes
            .get(&path)
            .ok_or_else(|| Error::status(NtStatus::NoSuchFile, path.clone()))?
            .clone();
        let fid = if register {
            self.next_fid.fetch_add(1, Ordering::SeqCst).max(1)
        } else {
            0
        };

        let file: FileRef = Arc::new(WebFile {
            fid,
            name: leaf_of(&path).to_string(),
            path: path.clone(),
            node,
            state: Arc::clone(&self.state),
            stream: tokio::sync::Mutex::new(None),
        });
        if register {
            self.state.adjust_open_count(&path, 1);
            self.open
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(fid, Arc::clone(&file));
        }
        Ok(file)
    }

    fn read_only(&self, what: &str) -> Error {
        Error::status(NtStatus::NotSupported, format!("read-only share: {}", what))
    }
}

#[async_trait]
impl Tree for WebTree {
    async fn open(&self, name: &str) -> Result<FileRef> {
        self.make_file(normalize_path(name), true)
    }

    async fn open_or_create(
        &self,
        name: &str,
        disposition: u32,
        _directory: bool,
    ) -> Result<FileRef> {
        match disposition {
            create_disposition::FILE_OPEN | create_disposition::FILE_OPEN_IF => {
                self.open(name).await
            }
            other => Err(Error::status(
                NtStatus::NotSupported,
                format!("create disposition {} on read-only share", other),
            )),
        }
    }

    async fn list(&self, pattern: &str) -> Result<Vec<FileRef>> {
        let pattern = normalize_path(pattern);
        let dir = parent_of(&pattern);
        let leaf = leaf_of(&pattern).to_string();

        self.state
            .nodes
            .keys()
            .filter(|path| {
                *path != "\\" && parent_of(path) == dir && matches_wildcard(&leaf, leaf_of(path))
            })
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .map(|path| self.make_file(path, false))
            .collect()
    }

    async fn create_file(&self, _name: &str) -> Result<FileRef> {
        Err(self.read_only("create file"))
    }

    async fn create_directory(&self, _name: &str) -> Result<FileRef> {
        Err(self.read_only("create directory"))
    }

    async fn delete(&self, _name: &str) -> Result<()> {
        Err(self.read_only("delete"))
    }

    async fn delete_directory(&self, _name: &str) -> Result<()> {
        Err(self.read_only("delete directory"))
    }

    async fn rename(&self, _file: FileRef, _new_path: &str) -> Result<()> {
        Err(self.read_only("rename"))
    }

    fn get_file(&self, fid: u16) -> Option<FileRef> {
        self.open
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&fid)
            .cloned()
    }

    async fn close_file(&self, fid: u16) -> Result<()> {
        let file = self
            .open
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&fid);
        match file {
            Some(file) => file.close().await,
            None => Err(Error::status(NtStatus::SmbBadFid, format!("fid {}", fid))),
        }
    }

    async fn disconnect(&self) {
        let files: Vec<FileRef> = self
            .open
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain()
            .map(|(_, f)| f)
            .collect();
        for file in files {
            let _ = file.close().await;
        }
    }
}

struct WebFile {
    fid: u16,
    name: String,
    path: String,
    node: RemoteNode,
    state: Arc<ShareState>,
    /// Started on the first read; the first read's offset becomes the
    /// range start.
    stream: tokio::sync::Mutex<Option<Arc<Rectifier>>>,
}

impl WebFile {
    fn entry(&self) -> Option<&ManifestEntry> {
        match &self.node {
            RemoteNode::File(entry) => Some(entry),
            RemoteNode::Directory => None,
        }
    }

    fn read_only(&self, what: &str) -> Error {
        Error::status(NtStatus::NotSupported, format!("read-only share: {}", what))
    }
}

#[async_trait]
impl File for WebFile {
    fn fid(&self) -> u16 {
        self.fid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn is_directory(&self) -> bool {
        matches!(self.node, RemoteNode::Directory)
    }

    fn size(&self) -> u64 {
        self.entry().map_or(0, |e| e.size)
    }

    fn allocation_size(&self) -> u64 {
        self.size().next_multiple_of(4096)
    }

    fn created(&self) -> u64 {
        self.entry().map_or(0, |e| e.created_ms)
    }

    fn last_modified(&self) -> u64 {
        self.entry().map_or(0, |e| e.modified_ms)
    }

    fn last_changed(&self) -> u64 {
        self.last_modified()
    }

    fn last_accessed(&self) -> u64 {
        self.last_modified()
    }

    fn attributes(&self) -> u32 {
        if self.is_directory() {
            file_attributes::DIRECTORY
        } else {
            file_attributes::READONLY
        }
    }

    fn create_action(&self) -> u32 {
        create_action::FILE_OPENED
    }

    async fn read(&self, buf: &mut [u8], position: u64) -> Result<usize> {
        let entry = self
            .entry()
            .ok_or_else(|| Error::status(NtStatus::FileIsADirectory, self.path.clone()))?;

        let stream = {
            let mut guard = self.stream.lock().await;
            match guard.as_ref() {
                Some(stream) => Arc::clone(stream),
                None => {
                    debug!(path = %self.path, start = position, "starting range stream");
                    let stream = Arc::new(Rectifier::new(
                        self.state.client.clone(),
                        entry.url.clone(),
                        self.state.headers.clone(),
                        entry.size,
                        position,
                    ));
                    *guard = Some(Arc::clone(&stream));
                    stream
                }
            }
        };
        stream.read(buf, position).await
    }

    async fn write(&self, _data: &[u8], _position: u64) -> Result<usize> {
        Err(self.read_only("write"))
    }

    async fn set_length(&self, _len: u64) -> Result<()> {
        Err(self.read_only("set length"))
    }

    async fn set_last_modified(&self, _ms: u64) -> Result<()> {
        Err(self.read_only("set times"))
    }

    fn set_delete_on_close(&self) -> Result<()> {
        Err(self.read_only("delete on close"))
    }

    async fn delete(&self) -> Result<()> {
        Err(self.read_only("delete"))
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(stream) = self.stream.lock().await.take() {
            stream.close();
        }
        if self.fid != 0 {
            self.state.adjust_open_count(&self.path, -1);
        }
        Ok(())
    }
}
