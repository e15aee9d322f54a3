//! SMB1 message codec: header + AndX-chained command blocks
//!
//! A decoded message owns an ordered list of commands. Handlers overwrite a
//! command's params/data in place; encoding then rewrites every AndX linkage
//! so each `AndXOffset` points at the absolute start of the next block.

use crate::error::{Error, Result};
use crate::protocol::constants::{
    command::NO_ANDX_COMMAND, is_andx_command, SMB_MAX_LENGTH, SMB_MIN_LENGTH,
};
use crate::protocol::header::SmbHeader;
use crate::wire::read_u16_le;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// One command block within an SMB1 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbCommand {
    pub command_id: u8,
    /// Number of parameter words on the wire. Usually `params.len() / 2`,
    /// but handlers may pin it (NT_CREATE_ANDX interop quirk).
    pub word_count: u8,
    pub params: Vec<u8>,
    pub byte_count: u16,
    pub data: Vec<u8>,
    /// Absolute offset of `params` from the header start. Scratch: set by
    /// decode, recomputed by encode.
    pub params_offset: u32,
    /// Absolute offset of `data` from the header start. Scratch like
    /// `params_offset`.
    pub data_offset: u32,
}

impl SmbCommand {
    pub fn new(command_id: u8) -> Self {
        Self {
            command_id,
            word_count: 0,
            params: Vec::new(),
            byte_count: 0,
            data: Vec::new(),
            params_offset: 0,
            data_offset: 0,
        }
    }

    /// Replace params and data, keeping word/byte counts in sync.
    pub fn set_body(&mut self, params: Vec<u8>, data: Vec<u8>) {
        self.word_count = (params.len() / 2) as u8;
        self.byte_count = data.len() as u16;
        self.params = params;
        self.data = data;
    }

    /// Whether this command carries AndX linkage words.
    pub fn is_andx(&self) -> bool {
        is_andx_command(self.command_id)
    }
}

/// A decoded SMB1 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbMessage {
    pub header: SmbHeader,
    pub commands: Vec<SmbCommand>,
    /// Set when a handler already sent its own response and encoding must
    /// be skipped.
    pub processed: bool,
}

impl SmbMessage {
    pub fn new(header: SmbHeader) -> Self {
        Self {
            header,
            commands: Vec::new(),
            processed: false,
        }
    }

    /// Decode a whole SMB1 message buffer.
    ///
    /// Rejects buffers outside `[SMB_MIN_LENGTH, SMB_MAX_LENGTH]` and
    /// buffers whose command chain runs past the end. A decoded message
    /// always holds at least one command.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < SMB_MIN_LENGTH || buf.len() > SMB_MAX_LENGTH {
            return Err(Error::Framing(format!(
                "message length {} outside [{}, {}]",
                buf.len(),
                SMB_MIN_LENGTH,
                SMB_MAX_LENGTH
            )));
        }

        let header = SmbHeader::parse(buf)?;
        let mut commands = Vec::new();

        let mut command_id = header.command;
        let mut offset = SmbHeader::SIZE;
        loop {
            let (command, next) = Self::decode_command(buf, offset, command_id)?;
            commands.push(command);
            match next {
                Some((next_id, next_offset)) => {
                    if next_offset <= offset {
                        return Err(Error::ParseError(format!(
                            "AndX offset {} does not advance past {}",
                            next_offset, offset
                        )));
                    }
                    command_id = next_id;
                    offset = next_offset;
                }
                None => break,
            }
        }

        Ok(Self {
            header,
            commands,
            processed: false,
        })
    }

    fn decode_command(
        buf: &[u8],
        offset: usize,
        command_id: u8,
    ) -> Result<(SmbCommand, Option<(u8, usize)>)> {
        if offset >= buf.len() {
            return Err(Error::ParseError(format!(
                "command block at {} past end of message ({})",
                offset,
                buf.len()
            )));
        }

        let word_count = buf[offset];
        let params_offset = offset + 1;
        let params_len = word_count as usize * 2;
        if params_offset + params_len + 2 > buf.len() {
            return Err(Error::BufferTooSmall {
                need: params_offset + params_len + 2,
                have: buf.len(),
            });
        }
        let params = buf[params_offset..params_offset + params_len].to_vec();

        let byte_count = read_u16_le(buf, params_offset + params_len)?;
        let data_offset = params_offset + params_len + 2;
        if data_offset + byte_count as usize > buf.len() {
            return Err(Error::BufferTooSmall {
                need: data_offset + byte_count as usize,
                have: buf.len(),
            });
        }
        let data = buf[data_offset..data_offset + byte_count as usize].to_vec();

        let mut next = None;
        if is_andx_command(command_id) && word_count >= 2 {
            let next_id = params[0];
            let next_offset = read_u16_le(&params, 2)? as usize;
            if next_id != NO_ANDX_COMMAND {
                next = Some((next_id, next_offset));
            }
        }

        let command = SmbCommand {
            command_id,
            word_count,
            params,
            byte_count,
            data,
            params_offset: params_offset as u32,
            data_offset: data_offset as u32,
        };
        Ok((command, next))
    }

    /// Encode this message, rewriting AndX linkage and the per-command
    /// offset scratch fields as blocks land at their final positions.
    pub fn encode(&mut self) -> Result<Vec<u8>> {
        let mut buf = self.header.serialize()?;

        let count = self.commands.len();
        for i in 0..count {
            let offset = buf.len();
            let next_id = if i + 1 < count {
                Some(self.commands[i + 1].command_id)
            } else {
                None
            };

            let command = &mut self.commands[i];
            command.params_offset = (offset + 1) as u32;
            command.data_offset = (offset + 1 + command.params.len() + 2) as u32;

            if command.is_andx() && command.params.len() >= 4 {
                match next_id {
                    Some(id) => {
                        let next_start = offset + 1 + command.params.len() + 2 + command.data.len();
                        if next_start > u16::MAX as usize {
                            return Err(Error::Framing(format!(
                                "AndX chain exceeds offset field at {}",
                                next_start
                            )));
                        }
                        command.params[0] = id;
                        command.params[1] = 0;
                        LittleEndian::write_u16(&mut command.params[2..4], next_start as u16);
                    }
                    None => {
                        command.params[0] = NO_ANDX_COMMAND;
                        command.params[1] = 0;
                        LittleEndian::write_u16(&mut command.params[2..4], 0);
                    }
                }
            }

            buf.write_u8(command.word_count)?;
            buf.extend_from_slice(&command.params);
            buf.write_u16::<LittleEndian>(command.byte_count)?;
            buf.extend_from_slice(&command.data);
        }

        if buf.len() > SMB_MAX_LENGTH {
            return Err(Error::Framing(format!(
                "encoded message length {} exceeds {}",
                buf.len(),
                SMB_MAX_LENGTH
            )));
        }
        Ok(buf)
    }
}
