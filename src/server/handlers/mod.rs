//! Command handlers
//!
//! One module per opcode family. Each handler is a pure transformation from
//! (request params, request data) to (status, response params, response
//! data); the dispatcher resolves them from the static table below and
//! commits their replies.

pub mod close;
pub mod create;
pub mod echo;
pub mod negotiate;
pub mod pathops;
pub mod read;
pub mod session_setup;
pub mod trans2;
pub mod tree;
pub mod write;

use crate::protocol::constants::command;
use crate::server::connection::ConnectionHandler;
use crate::server::dispatcher::{CommandContext, CommandReply, Handler, HandlerFuture, ReplyBody};

/// Wrap an async handler into the boxed-future shape the registry stores.
macro_rules! boxed_handler {
    ($name:ident, $path:path) => {
        fn $name<'a>(conn: &'a mut ConnectionHandler, ctx: CommandContext) -> HandlerFuture<'a> {
            Box::pin($path(conn, ctx))
        }
    };
}

boxed_handler!(h_negotiate, negotiate::handle);
boxed_handler!(h_session_setup, session_setup::handle);
boxed_handler!(h_logoff, session_setup::handle_logoff);
boxed_handler!(h_tree_connect, tree::handle_connect);
boxed_handler!(h_tree_disconnect, tree::handle_disconnect);
boxed_handler!(h_nt_create, create::handle);
boxed_handler!(h_read, read::handle);
boxed_handler!(h_write, write::handle);
boxed_handler!(h_close, close::handle);
boxed_handler!(h_flush, close::handle_flush);
boxed_handler!(h_delete, pathops::handle_delete);
boxed_handler!(h_rename, pathops::handle_rename);
boxed_handler!(h_create_directory, pathops::handle_create_directory);
boxed_handler!(h_delete_directory, pathops::handle_delete_directory);
boxed_handler!(h_check_directory, pathops::handle_check_directory);
boxed_handler!(h_echo, echo::handle);
boxed_handler!(h_trans2, trans2::handle);
boxed_handler!(h_find_close2, trans2::handle_find_close2);

/// Static command registry. Known commands without an entry report
/// `STATUS_NOT_IMPLEMENTED` from the dispatcher.
pub fn handler_for(id: u8) -> Option<Handler> {
    let handler: Handler = match id {
        command::NEGOTIATE => h_negotiate,
        command::SESSION_SETUP_ANDX => h_session_setup,
        command::LOGOFF_ANDX => h_logoff,
        command::TREE_CONNECT_ANDX => h_tree_connect,
        command::TREE_DISCONNECT => h_tree_disconnect,
        command::NT_CREATE_ANDX => h_nt_create,
        command::READ_ANDX => h_read,
        command::WRITE_ANDX => h_write,
        command::CLOSE => h_close,
        command::FLUSH => h_flush,
        command::DELETE => h_delete,
        command::RENAME => h_rename,
        command::CREATE_DIRECTORY => h_create_directory,
        command::DELETE_DIRECTORY => h_delete_directory,
        command::CHECK_DIRECTORY => h_check_directory,
        command::ECHO => h_echo,
        command::TRANSACTION2 => h_trans2,
        command::FIND_CLOSE2 => h_find_close2,
        _ => return None,
    };
    Some(handler)
}

/// AndX reply linkage placeholder; the encoder rewrites it once the final
/// block positions are known.
pub(crate) fn andx_reply_params(extra: &[u8]) -> Vec<u8> {
    let mut params = vec![command::NO_ANDX_COMMAND, 0, 0, 0];
    params.extend_from_slice(extra);
    params
}

pub(crate) fn done(params: Vec<u8>, data: Vec<u8>) -> CommandReply {
    CommandReply::Done(ReplyBody::new(params, data))
}

pub(crate) fn done_empty() -> CommandReply {
    CommandReply::Done(ReplyBody::empty())
}
