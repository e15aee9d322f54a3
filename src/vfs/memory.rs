//! In-memory share backend
//!
//! A fully mutable tree held in process memory. Serves as the test backend
//! and as a scratch share for local use. The node store is guarded by a
//! std RwLock; no lock is ever held across an await point.

use super::{
    leaf_of, matches_wildcard, normalize_path, parent_of, File, FileRef, Share, Tree, TreeRef,
};
use crate::auth::Session;
use crate::error::{Error, Result};
use crate::protocol::constants::{create_action, create_disposition, file_attributes};
use crate::NtStatus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Clone)]
struct MemoryNode {
    data: Vec<u8>,
    directory: bool,
    created: u64,
    modified: u64,
    changed: u64,
    accessed: u64,
}

impl MemoryNode {
    fn new(directory: bool) -> Self {
        let now = now_ms();
        Self {
            data: Vec::new(),
            directory,
            created: now,
            modified: now,
            changed: now,
            accessed: now,
        }
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

type NodeStore = Arc<RwLock<HashMap<String, MemoryNode>>>;

fn store_read(nodes: &NodeStore) -> std::sync::RwLockReadGuard<'_, HashMap<String, MemoryNode>> {
    nodes.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn store_write(nodes: &NodeStore) -> std::sync::RwLockWriteGuard<'_, HashMap<String, MemoryNode>> {
    nodes.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A share backed by process memory.
pub struct MemoryShare {
    name: String,
    description: String,
    nodes: NodeStore,
}

impl MemoryShare {
    pub fn new(name: &str) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("\\".to_string(), MemoryNode::new(true));
        Self {
            name: name.to_string(),
            description: "In-memory share".to_string(),
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    /// Seed a file, creating missing parent directories.
    pub fn add_file(&self, path: &str, contents: &[u8]) {
        let path = normalize_path(path);
        let mut nodes = store_write(&self.nodes);
        let mut dir = parent_of(&path);
        while dir != "\\" && !nodes.contains_key(&dir) {
            nodes.insert(dir.clone(), MemoryNode::new(true));
            dir = parent_of(&dir);
        }
        let mut node = MemoryNode::new(false);
        node.data = contents.to_vec();
        nodes.insert(path, node);
    }

    /// Seed a directory.
    pub fn add_directory(&self, path: &str) {
        store_write(&self.nodes).insert(normalize_path(path), MemoryNode::new(true));
    }
}

#[async_trait]
impl Share for MemoryShare {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_named_pipe(&self) -> bool {
        false
    }

    async fn connect(&self, _session: &Session, _share_password: Option<&str>) -> Result<TreeRef> {
        Ok(Arc::new(MemoryTree {
            nodes: Arc::clone(&self.nodes),
            open: Mutex::new(HashMap::new()),
            next_fid: AtomicU16::new(1),
        }))
    }
}

/// A connected view of a [`MemoryShare`].
pub struct MemoryTree {
    nodes: NodeStore,
    open: Mutex<HashMap<u16, FileRef>>,
    next_fid: AtomicU16,
}

impl MemoryTree {
    fn allocate_fid(&self) -> u16 {
        self.next_fid.fetch_add(1, Ordering::SeqCst).max(1)
    }

    fn make_file(&self, path: String, action: u32, register: bool) -> Result<FileRef> {
        let directory = store_read(&self.nodes)
            .get(&path)
            .ok_or_else(|| Error::status(NtStatus::NoSuchFile, path.clone()))?
            .directory;
        let fid = if register { self.allocate_fid() } else { 0 };
        let file: FileRef = Arc::new(MemoryFile {
            fid,
            name: leaf_of(&path).to_string(),
            path,
            directory,
            action,
            nodes: Arc::clone(&self.nodes),
            delete_on_close: AtomicBool::new(false),
        });
        if register {
            self.open
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(fid, Arc::clone(&file));
        }
        Ok(file)
    }
}

#[async_trait]
impl Tree for MemoryTree {
    async fn open(&self, name: &str) -> Result<FileRef> {
        self.make_file(normalize_path(name), create_action::FILE_OPENED, true)
    }

    async fn open_or_create(
        &self,
        name: &str,
        disposition: u32,
        directory: bool,
    ) -> Result<FileRef> {
        let path = normalize_path(name);
        let action = {
            let mut nodes = store_write(&self.nodes);
            let exists = nodes.contains_key(&path);
            match disposition {
                create_disposition::FILE_OPEN => {
                    if !exists {
                        return Err(Error::status(NtStatus::NoSuchFile, path));
                    }
                    create_action::FILE_OPENED
                }
                create_disposition::FILE_CREATE => {
                    if exists {
                        return Err(Error::status(NtStatus::ObjectNameCollision, path));
                    }
                    nodes.insert(path.clone(), MemoryNode::new(directory));
                    create_action::FILE_CREATED
                }
                create_disposition::FILE_OPEN_IF => {
                    if !exists {
                        nodes.insert(path.clone(), MemoryNode::new(directory));
                        create_action::FILE_CREATED
                    } else {
                        create_action::FILE_OPENED
                    }
                }
                create_disposition::FILE_OVERWRITE => {
                    let node = nodes
                        .get_mut(&path)
                        .ok_or_else(|| Error::status(NtStatus::NoSuchFile, path.clone()))?;
                    node.data.clear();
                    node.modified = now_ms();
                    create_action::FILE_OVERWRITTEN
                }
                create_disposition::FILE_SUPERSEDE | create_disposition::FILE_OVERWRITE_IF => {
                    let node = nodes
                        .entry(path.clone())
                        .or_insert_with(|| MemoryNode::new(directory));
                    node.data.clear();
                    node.modified = now_ms();
                    if exists {
                        create_action::FILE_OVERWRITTEN
                    } else {
                        create_action::FILE_CREATED
                    }
                }
                other => {
                    return Err(Error::status(
                        NtStatus::InvalidParameter,
                        format!("create disposition {}", other),
                    ))
                }
            }
        };

        self.make_file(path, action, true)
    }

    async fn list(&self, pattern: &str) -> Result<Vec<FileRef>> {
        let pattern = normalize_path(pattern);
        let dir = parent_of(&pattern);
        let leaf = leaf_of(&pattern).to_string();

        let mut matching: Vec<String> = store_read(&self.nodes)
            .keys()
            .filter(|path| {
                *path != "\\" && parent_of(path) == dir && matches_wildcard(&leaf, leaf_of(path))
            })
            .cloned()
            .collect();
        matching.sort();

        matching
            .into_iter()
            .map(|path| self.make_file(path, create_action::FILE_OPENED, false))
            .collect()
    }

    async fn create_file(&self, name: &str) -> Result<FileRef> {
        self.open_or_create(name, create_disposition::FILE_CREATE, false)
            .await
    }

    async fn create_directory(&self, name: &str) -> Result<FileRef> {
        self.open_or_create(name, create_disposition::FILE_CREATE, true)
            .await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = normalize_path(name);
        let mut nodes = store_write(&self.nodes);
        match nodes.get(&path) {
            None => Err(Error::status(NtStatus::NoSuchFile, path)),
            Some(node) if node.directory => Err(Error::status(NtStatus::FileIsADirectory, path)),
            Some(_) => {
                nodes.remove(&path);
                Ok(())
            }
        }
    }

    async fn delete_directory(&self, name: &str) -> Result<()> {
        let path = normalize_path(name);
        let mut nodes = store_write(&self.nodes);
        match nodes.get(&path) {
            None => Err(Error::status(NtStatus::NoSuchFile, path)),
            Some(node) if !node.directory => Err(Error::status(NtStatus::NotADirectory, path)),
            Some(_) => {
                let occupied = nodes.keys().any(|p| parent_of(p) == path);
                if occupied {
                    return Err(Error::status(NtStatus::DirectoryNotEmpty, path));
                }
                nodes.remove(&path);
                Ok(())
            }
        }
    }

    async fn rename(&self, file: FileRef, new_path: &str) -> Result<()> {
        let old_path = file.path().to_string();
        let new_path = normalize_path(new_path);
        let mut nodes = store_write(&self.nodes);
        if nodes.contains_key(&new_path) {
            return Err(Error::status(NtStatus::ObjectNameCollision, new_path));
        }
        match nodes.remove(&old_path) {
            Some(mut node) => {
                node.changed = now_ms();
                nodes.insert(new_path, node);
                Ok(())
            }
            None => Err(Error::status(NtStatus::NoSuchFile, old_path)),
        }
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

struct MemoryFile {
    fid: u16,
    name: String,
    path: String,
    directory: bool,
    action: u32,
    nodes: NodeStore,
    delete_on_close: AtomicBool,
}

impl MemoryFile {
    fn with_node<T>(&self, default: T, f: impl FnOnce(&MemoryNode) -> T) -> T {
        store_read(&self.nodes).get(&self.path).map_or(default, f)
    }
}

#[async_trait]
impl File for MemoryFile {
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
        self.directory
    }

    fn size(&self) -> u64 {
        self.with_node(0, |n| n.data.len() as u64)
    }

    fn allocation_size(&self) -> u64 {
        self.size().next_multiple_of(4096)
    }

    fn created(&self) -> u64 {
        self.with_node(0, |n| n.created)
    }

    fn last_modified(&self) -> u64 {
        self.with_node(0, |n| n.modified)
    }

    fn last_changed(&self) -> u64 {
        self.with_node(0, |n| n.changed)
    }

    fn last_accessed(&self) -> u64 {
        self.with_node(0, |n| n.accessed)
    }

    fn attributes(&self) -> u32 {
        if self.directory {
            file_attributes::DIRECTORY
        } else {
            file_attributes::NORMAL
        }
    }

    fn create_action(&self) -> u32 {
        self.action
    }

    async fn read(&self, buf: &mut [u8], position: u64) -> Result<usize> {
        if self.directory {
            return Err(Error::status(NtStatus::FileIsADirectory, self.path.clone()));
        }
        let nodes = store_read(&self.nodes);
        let node = nodes
            .get(&self.path)
            .ok_or_else(|| Error::status(NtStatus::NoSuchFile, self.path.clone()))?;
        let start = (position as usize).min(node.data.len());
        let end = (start + buf.len()).min(node.data.len());
        buf[..end - start].copy_from_slice(&node.data[start..end]);
        Ok(end - start)
    }

    async fn write(&self, data: &[u8], position: u64) -> Result<usize> {
        if self.directory {
            return Err(Error::status(NtStatus::FileIsADirectory, self.path.clone()));
        }
        let mut nodes = store_write(&self.nodes);
        let node = nodes
            .get_mut(&self.path)
            .ok_or_else(|| Error::status(NtStatus::NoSuchFile, self.path.clone()))?;
        let end = position as usize + data.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[position as usize..end].copy_from_slice(data);
        node.modified = now_ms();
        Ok(data.len())
    }

    async fn set_length(&self, len: u64) -> Result<()> {
        let mut nodes = store_write(&self.nodes);
        let node = nodes
            .get_mut(&self.path)
            .ok_or_else(|| Error::status(NtStatus::NoSuchFile, self.path.clone()))?;
        node.data.resize(len as usize, 0);
        node.modified = now_ms();
        Ok(())
    }

    async fn set_last_modified(&self, ms: u64) -> Result<()> {
        if let Some(node) = store_write(&self.nodes).get_mut(&self.path) {
            node.modified = ms;
        }
        Ok(())
    }

    fn set_delete_on_close(&self) -> Result<()> {
        self.delete_on_close.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        store_write(&self.nodes)
            .remove(&self.path)
            .map(|_| ())
            .ok_or_else(|| Error::status(NtStatus::NoSuchFile, self.path.clone()))
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.delete_on_close.swap(false, Ordering::SeqCst) {
            store_write(&self.nodes).remove(&self.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            uid: 1,
            account: "test".into(),
            domain: "WORKGROUP".into(),
            guest: false,
        }
    }

    async fn tree() -> TreeRef {
        let share = MemoryShare::new("scratch");
        share.add_file("docs\\a.txt", b"alpha");
        share.add_file("docs\\b.md", b"beta");
        share.connect(&session(), None).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_read() {
        let tree = tree().await;
        let file = tree.open("\\docs\\a.txt").await.unwrap();
        assert!(!file.is_directory());
        assert_eq!(file.size(), 5);

        let mut buf = [0u8; 16];
        let n = file.read(&mut buf, 0).await.unwrap();
        assert_eq!(&buf[..n], b"alpha");

        let n = file.read(&mut buf, 3).await.unwrap();
        assert_eq!(&buf[..n], b"ha");
    }

    #[tokio::test]
    async fn test_list_wildcards() {
        let tree = tree().await;
        let all = tree.list("\\docs\\*").await.unwrap();
        assert_eq!(all.len(), 2);
        let txt = tree.list("\\docs\\*.txt").await.unwrap();
        assert_eq!(txt.len(), 1);
        assert_eq!(txt[0].name(), "a.txt");
    }

    #[tokio::test]
    async fn test_dispositions() {
        let tree = tree().await;
        assert!(tree
            .open_or_create("\\docs\\a.txt", create_disposition::FILE_CREATE, false)
            .await
            .is_err());

        let created = tree
            .open_or_create("\\docs\\new.bin", create_disposition::FILE_OPEN_IF, false)
            .await
            .unwrap();
        assert_eq!(created.create_action(), create_action::FILE_CREATED);

        let over = tree
            .open_or_create("\\docs\\a.txt", create_disposition::FILE_OVERWRITE_IF, false)
            .await
            .unwrap();
        assert_eq!(over.create_action(), create_action::FILE_OVERWRITTEN);
        assert_eq!(over.size(), 0);
    }

    #[tokio::test]
    async fn test_delete_on_close() {
        let tree = tree().await;
        let file = tree.open("\\docs\\a.txt").await.unwrap();
        let fid = file.fid();
        assert!(tree.get_file(fid).is_some());
        file.set_delete_on_close().unwrap();
        tree.close_file(fid).await.unwrap();
        assert!(tree.get_file(fid).is_none());
        assert!(tree.open("\\docs\\a.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_rename() {
        let tree = tree().await;
        let file = tree.open("\\docs\\a.txt").await.unwrap();
        tree.rename(Arc::clone(&file), "\\docs\\renamed.txt")
            .await
            .unwrap();
        assert!(tree.open("\\docs\\renamed.txt").await.is_ok());
        assert_eq!(
            tree.rename(file, "\\docs\\b.md").await.unwrap_err().nt_status(),
            NtStatus::NoSuchFile
        );
    }

    #[tokio::test]
    async fn test_delete_directory_rules() {
        let tree = tree().await;
        assert!(tree.delete_directory("\\docs").await.is_err());
        tree.delete("\\docs\\a.txt").await.unwrap();
        tree.delete("\\docs\\b.md").await.unwrap();
        tree.delete_directory("\\docs").await.unwrap();
    }
}
