//! Per-connection state and the receive loop
//!
//! One `ConnectionHandler` per TCP connection. Owns the UID and TID tables,
//! the NEGOTIATE challenge, and the TRANS2 search state; processes messages
//! strictly in arrival order so responses are emitted in request order.

use crate::auth::Session;
use crate::error::{Error, NtStatus, Result};
use crate::netbios::{name::called_name_from_session_request, NetBiosMessage};
use crate::protocol::message::SmbMessage;
use crate::protocol::NetBiosMessageType;
use crate::server::{dispatcher, ServerContext};
use crate::transport::TcpTransport;
use crate::vfs::{FileRef, TreeRef};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// A tree connected on this connection.
pub struct ConnectedTree {
    pub share_name: String,
    pub named_pipe: bool,
    pub tree: TreeRef,
}

/// Directory search in progress across FIND_FIRST2/FIND_NEXT2.
pub struct SearchState {
    pub entries: Vec<FileRef>,
    pub next: usize,
    pub close_at_end: bool,
}

pub struct ConnectionHandler {
    transport: TcpTransport,
    pub server: Arc<ServerContext>,
    challenge: Option<[u8; 8]>,
    sessions: HashMap<u16, Session>,
    trees: HashMap<u16, ConnectedTree>,
    searches: HashMap<u16, SearchState>,
    next_uid: u16,
    next_tid: u16,
    next_sid: u16,
}

impl ConnectionHandler {
    pub fn new(transport: TcpTransport, server: Arc<ServerContext>) -> Self {
        Self {
            transport,
            server,
            challenge: None,
            sessions: HashMap::new(),
            trees: HashMap::new(),
            searches: HashMap::new(),
            next_uid: 1,
            next_tid: 1,
            next_sid: 1,
        }
    }

    /// Receive loop: frame in, decode, dispatch, encode, frame out.
    pub async fn handle(&mut self) -> Result<()> {
        let result = self.serve().await;
        self.teardown().await;
        match result {
            Err(Error::ConnectionClosed) => Ok(()),
            other => other,
        }
    }

    async fn serve(&mut self) -> Result<()> {
        loop {
            let (kind, payload) = self.transport.receive_netbios_message().await?;
            match kind {
                NetBiosMessageType::SessionRequest => {
                    if let Some(called) = called_name_from_session_request(&payload) {
                        debug!(called = %called, "NetBIOS session request");
                    }
                    let response = NetBiosMessage::positive_response()?;
                    self.transport.send_raw(&response.to_bytes()).await?;
                }
                NetBiosMessageType::SessionMessage => {
                    let mut msg = match SmbMessage::decode(&payload) {
                        Ok(msg) => msg,
                        Err(e) => {
                            // Framing errors reject the message before dispatch
                            warn!(error = %e, "rejecting malformed message");
                            return Err(e);
                        }
                    };

                    dispatcher::dispatch(self, &mut msg).await;

                    if !msg.processed {
                        let bytes = msg.encode()?;
                        self.transport.send_netbios_message(&bytes).await?;
                    }
                }
                other => {
                    trace!(?other, "ignoring NetBIOS message");
                }
            }
        }
    }

    /// Close every tree (and with them all open files and their upstream
    /// transfers) when the connection goes away.
    async fn teardown(&mut self) {
        for (_, connected) in self.trees.drain() {
            connected.tree.disconnect().await;
        }
        self.sessions.clear();
        self.searches.clear();
        let _ = self.transport.close().await;
    }

    /// Send an extra response message from inside a handler (ECHO).
    pub async fn send_message(&mut self, msg: &mut SmbMessage) -> Result<()> {
        let bytes = msg.encode()?;
        self.transport.send_netbios_message(&bytes).await
    }

    // Challenge lifecycle

    pub fn set_challenge(&mut self, challenge: [u8; 8]) {
        self.challenge = Some(challenge);
    }

    pub fn challenge(&self) -> Option<&[u8; 8]> {
        self.challenge.as_ref()
    }

    // Session table

    pub fn register_session(&mut self, account: String, domain: String, guest: bool) -> u16 {
        let uid = self.next_uid;
        self.next_uid = self.next_uid.wrapping_add(1).max(1);
        info!(uid, account = %account, guest, "session established");
        self.sessions.insert(
            uid,
            Session {
                uid,
                account,
                domain,
                guest,
            },
        );
        uid
    }

    pub fn session(&self, uid: u16) -> Result<&Session> {
        self.sessions
            .get(&uid)
            .ok_or_else(|| Error::status(NtStatus::SmbBadUid, format!("uid {}", uid)))
    }

    pub fn remove_session(&mut self, uid: u16) -> Option<Session> {
        self.sessions.remove(&uid)
    }

    // Tree table

    pub fn register_tree(&mut self, share_name: String, named_pipe: bool, tree: TreeRef) -> u16 {
        let tid = self.next_tid;
        self.next_tid = self.next_tid.wrapping_add(1).max(1);
        info!(tid, share = %share_name, "tree connected");
        self.trees.insert(
            tid,
            ConnectedTree {
                share_name,
                named_pipe,
                tree,
            },
        );
        tid
    }

    pub fn tree(&self, tid: u16) -> Result<&ConnectedTree> {
        self.trees
            .get(&tid)
            .ok_or_else(|| Error::status(NtStatus::SmbBadTid, format!("tid {}", tid)))
    }

    pub fn remove_tree(&mut self, tid: u16) -> Option<ConnectedTree> {
        self.trees.remove(&tid)
    }

    /// Resolve an open file on the tree bound to `tid`.
    pub fn file(&self, tid: u16, fid: u16) -> Result<FileRef> {
        let connected = self.tree(tid)?;
        connected
            .tree
            .get_file(fid)
            .ok_or_else(|| Error::status(NtStatus::SmbBadFid, format!("fid {}", fid)))
    }

    // TRANS2 search state

    pub fn register_search(&mut self, state: SearchState) -> u16 {
        let sid = self.next_sid;
        self.next_sid = self.next_sid.wrapping_add(1).max(1);
        self.searches.insert(sid, state);
        sid
    }

    pub fn search_mut(&mut self, sid: u16) -> Option<&mut SearchState> {
        self.searches.get_mut(&sid)
    }

    pub fn end_search(&mut self, sid: u16) {
        self.searches.remove(&sid);
    }
}
