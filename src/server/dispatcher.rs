//! Command dispatch
//!
//! Walks a decoded message's command chain in order, resolves each handler
//! from the static registry, and commits the handler's reply into the
//! message. The first failing command aborts the rest of the chain; its
//! params and data are emptied and its status lands in the header.

use crate::error::{NtStatus, Result};
use crate::protocol::constants::command_name;
use crate::protocol::header::SmbHeader;
use crate::protocol::message::SmbMessage;
use crate::server::connection::ConnectionHandler;
use crate::server::handlers;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, trace, warn};

/// Everything a handler sees about its command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub command_id: u8,
    pub params: Vec<u8>,
    pub data: Vec<u8>,
    /// Absolute offset of `params` from the SMB header start.
    pub params_offset: u32,
    /// Absolute offset of `data` from the SMB header start.
    pub data_offset: u32,
    pub header: SmbHeader,
}

/// A committed reply body.
#[derive(Debug, Default)]
pub struct ReplyBody {
    pub params: Vec<u8>,
    pub data: Vec<u8>,
    /// Override the derived word count (interop quirks only).
    pub word_count: Option<u8>,
    /// Override the derived byte count.
    pub byte_count: Option<u16>,
    /// Commit and keep going with MORE_PROCESSING_REQUIRED in the header.
    pub more_processing: bool,
    /// New UID to stamp into the response header.
    pub set_uid: Option<u16>,
    /// New TID to stamp into the response header.
    pub set_tid: Option<u16>,
}

impl ReplyBody {
    pub fn new(params: Vec<u8>, data: Vec<u8>) -> Self {
        Self {
            params,
            data,
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// Handler outcome.
#[derive(Debug)]
pub enum CommandReply {
    /// Commit this body and continue with the next chained command.
    Done(ReplyBody),
    /// The handler already sent its own response; skip encoding.
    AlreadyReplied,
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<CommandReply>> + Send + 'a>>;

/// Handlers are plain function values resolved from a compile-time table.
pub type Handler = for<'a> fn(&'a mut ConnectionHandler, CommandContext) -> HandlerFuture<'a>;

/// Process every command of `msg` in order, mutating it into the response.
///
/// Commands never run in parallel: a chained command may depend on header
/// state (UID, TID) its predecessor established.
pub async fn dispatch(conn: &mut ConnectionHandler, msg: &mut SmbMessage) {
    let mut failure: Option<(usize, NtStatus)> = None;

    for index in 0..msg.commands.len() {
        let command_id = msg.commands[index].command_id;
        let name = match command_name(command_id) {
            Some(name) => name,
            None => {
                warn!(command_id, "unknown command");
                failure = Some((index, NtStatus::SmbBadCommand));
                break;
            }
        };
        let handler = match handlers::handler_for(command_id) {
            Some(handler) => handler,
            None => {
                debug!(command = name, "no handler registered");
                failure = Some((index, NtStatus::NotImplemented));
                break;
            }
        };

        let ctx = {
            let cmd = &msg.commands[index];
            CommandContext {
                command_id,
                params: cmd.params.clone(),
                data: cmd.data.clone(),
                params_offset: cmd.params_offset,
                data_offset: cmd.data_offset,
                header: msg.header.clone(),
            }
        };

        trace!(command = name, index, "dispatching");
        match handler(conn, ctx).await {
            Ok(CommandReply::AlreadyReplied) => {
                msg.processed = true;
                return;
            }
            Ok(CommandReply::Done(body)) => {
                if let Some(uid) = body.set_uid {
                    msg.header.uid = uid;
                }
                if let Some(tid) = body.set_tid {
                    msg.header.tid = tid;
                }
                if body.more_processing {
                    msg.header.status = NtStatus::MoreProcessingRequired as u32;
                }
                let cmd = &mut msg.commands[index];
                cmd.word_count = body
                    .word_count
                    .unwrap_or((body.params.len() / 2) as u8);
                cmd.byte_count = body.byte_count.unwrap_or(body.data.len() as u16);
                cmd.params = body.params;
                cmd.data = body.data;
            }
            Err(e) => {
                let status = e.nt_status();
                debug!(command = name, status = %status, error = %e, "command failed");
                failure = Some((index, status));
                break;
            }
        }
    }

    if let Some((index, status)) = failure {
        msg.header.status = status as u32;
        let cmd = &mut msg.commands[index];
        cmd.set_body(Vec::new(), Vec::new());
        msg.commands.truncate(index + 1);
    }

    msg.header.mark_reply();
}
