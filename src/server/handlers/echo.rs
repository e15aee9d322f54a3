//! SMB_COM_ECHO
//!
//! Sends its own responses (one per requested repetition, with a running
//! sequence number) and tells the dispatcher the message is already
//! answered.

use crate::error::{Error, Result};
use crate::protocol::message::{SmbCommand, SmbMessage};
use crate::server::connection::ConnectionHandler;
use crate::server::dispatcher::{CommandContext, CommandReply};
use crate::wire::read_u16_le;
use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;

pub async fn handle(conn: &mut ConnectionHandler, ctx: CommandContext) -> Result<CommandReply> {
    if ctx.params.len() < 2 {
        return Err(Error::ParseError("echo params too short".into()));
    }
    let echo_count = read_u16_le(&ctx.params, 0)?;
    trace!(echo_count, "echo");

    for sequence in 1..=echo_count {
        let mut header = ctx.header.clone();
        header.status = 0;
        header.mark_reply();

        let mut command = SmbCommand::new(ctx.command_id);
        let mut params = [0u8; 2];
        LittleEndian::write_u16(&mut params, sequence);
        command.set_body(params.to_vec(), ctx.data.clone());

        let mut msg = SmbMessage::new(header);
        msg.commands.push(command);
        conn.send_message(&mut msg).await?;
    }

    Ok(CommandReply::AlreadyReplied)
}
