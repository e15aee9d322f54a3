//! Hand-rolled SMB1 client for exercising the server end to end
//!
//! Requests are built with the same codec the server uses, so the tests
//! exercise decode and encode from both sides of the wire.

use crate::error::Result;
use crate::protocol::constants::{capabilities, command, trans2, DIALECT_NT_LM_012};
use crate::protocol::header::SmbHeader;
use crate::protocol::message::{SmbCommand, SmbMessage};
use crate::transport::TcpTransport;
use crate::wire::{pad_to_align, read_u16_le, unicode_bytes, unicode_bytes_nul};
use byteorder::{LittleEndian, WriteBytesExt};

pub struct TestClient {
    transport: TcpTransport,
    pub uid: u16,
    pub tid: u16,
    mid: u16,
}

/// Absolute offset of a single command's data block: header, word count,
/// params, byte count.
fn data_offset_for(params_len: usize) -> usize {
    SmbHeader::SIZE + 1 + params_len + 2
}

fn andx(extra: &[u8]) -> Vec<u8> {
    let mut params = vec![command::NO_ANDX_COMMAND, 0, 0, 0];
    params.extend_from_slice(extra);
    params
}

impl TestClient {
    pub fn new(transport: TcpTransport) -> Self {
        Self {
            transport,
            uid: 0,
            tid: 0,
            mid: 1,
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    fn request(&mut self, command_id: u8) -> SmbMessage {
        let mut header = SmbHeader::new(command_id);
        header.uid = self.uid;
        header.tid = self.tid;
        header.mid = self.mid;
        self.mid += 1;
        SmbMessage::new(header)
    }

    pub async fn send(&mut self, msg: &mut SmbMessage) -> Result<()> {
        let bytes = msg.encode()?;
        self.transport.send_netbios_message(&bytes).await
    }

    pub async fn recv(&mut self) -> Result<SmbMessage> {
        let (_, payload) = self.transport.receive_netbios_message().await?;
        SmbMessage::decode(&payload)
    }

    pub async fn roundtrip(
        &mut self,
        command_id: u8,
        params: Vec<u8>,
        data: Vec<u8>,
    ) -> Result<SmbMessage> {
        let mut msg = self.request(command_id);
        let mut cmd = SmbCommand::new(command_id);
        cmd.set_body(params, data);
        msg.commands.push(cmd);
        self.send(&mut msg).await?;
        self.recv().await
    }

    /// NEGOTIATE; returns the response and the server challenge.
    pub async fn negotiate(&mut self) -> Result<(SmbMessage, [u8; 8])> {
        let mut data = vec![0x02];
        data.extend_from_slice(DIALECT_NT_LM_012.as_bytes());
        data.push(0);

        let resp = self.roundtrip(command::NEGOTIATE, Vec::new(), data).await?;
        let mut challenge = [0u8; 8];
        let resp_data = &resp.commands[0].data;
        if resp_data.len() >= 8 {
            challenge.copy_from_slice(&resp_data[..8]);
        }
        Ok((resp, challenge))
    }

    pub fn session_setup_body(
        lm_response: &[u8],
        nt_response: &[u8],
        account: &str,
        domain: &str,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut extra = Vec::with_capacity(22);
        extra.write_u16::<LittleEndian>(0xFFFF)?; // max buffer size
        extra.write_u16::<LittleEndian>(2)?; // max mpx count
        extra.write_u16::<LittleEndian>(0)?; // vc number
        extra.write_u32::<LittleEndian>(0)?; // session key
        extra.write_u16::<LittleEndian>(lm_response.len() as u16)?;
        extra.write_u16::<LittleEndian>(nt_response.len() as u16)?;
        extra.write_u32::<LittleEndian>(0)?; // reserved
        extra.write_u32::<LittleEndian>(
            capabilities::CAP_UNICODE | capabilities::CAP_NT_SMBS | capabilities::CAP_STATUS32,
        )?;
        let params = andx(&extra);

        let mut data = Vec::new();
        data.extend_from_slice(lm_response);
        data.extend_from_slice(nt_response);
        let abs = data_offset_for(params.len()) + data.len();
        data.extend(std::iter::repeat(0u8).take(pad_to_align(abs, 2)));
        data.extend_from_slice(&unicode_bytes_nul(account));
        data.extend_from_slice(&unicode_bytes_nul(domain));
        data.extend_from_slice(&unicode_bytes_nul("TestOS"));
        data.extend_from_slice(&unicode_bytes_nul("TestClient"));
        Ok((params, data))
    }

    /// SESSION_SETUP_ANDX; adopts the UID from the response header.
    pub async fn session_setup(
        &mut self,
        lm_response: &[u8],
        nt_response: &[u8],
        account: &str,
        domain: &str,
    ) -> Result<SmbMessage> {
        let (params, data) = Self::session_setup_body(lm_response, nt_response, account, domain)?;
        let resp = self
            .roundtrip(command::SESSION_SETUP_ANDX, params, data)
            .await?;
        if resp.header.status == 0 {
            self.uid = resp.header.uid;
        }
        Ok(resp)
    }

    pub async fn session_setup_guest(&mut self) -> Result<SmbMessage> {
        self.session_setup(&[0], &[], "", "").await
    }

    pub fn tree_connect_body(share_path: &str) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut extra = Vec::with_capacity(4);
        extra.write_u16::<LittleEndian>(0)?; // flags
        extra.write_u16::<LittleEndian>(1)?; // password length
        let params = andx(&extra);

        let mut data = vec![0u8]; // empty password
        let abs = data_offset_for(params.len()) + data.len();
        data.extend(std::iter::repeat(0u8).take(pad_to_align(abs, 2)));
        data.extend_from_slice(&unicode_bytes_nul(share_path));
        data.extend_from_slice(b"?????\0");
        Ok((params, data))
    }

    /// TREE_CONNECT_ANDX; adopts the TID from the response header.
    pub async fn tree_connect(&mut self, share: &str) -> Result<SmbMessage> {
        let (params, data) = Self::tree_connect_body(&format!("\\\\SERVER\\{}", share))?;
        let resp = self
            .roundtrip(command::TREE_CONNECT_ANDX, params, data)
            .await?;
        if resp.header.status == 0 {
            self.tid = resp.header.tid;
        }
        Ok(resp)
    }

    pub fn nt_create_body(path: &str, create_flags: u32, disposition: u32, options: u32) -> Result<(Vec<u8>, Vec<u8>)> {
        let name = unicode_bytes(path);

        let mut extra = Vec::with_capacity(44);
        extra.write_u8(0)?; // reserved
        extra.write_u16::<LittleEndian>(name.len() as u16)?;
        extra.write_u32::<LittleEndian>(create_flags)?;
        extra.write_u32::<LittleEndian>(0)?; // root directory fid
        extra.write_u32::<LittleEndian>(0x0012_0089)?; // desired access: generic read
        extra.write_u64::<LittleEndian>(0)?; // allocation size
        extra.write_u32::<LittleEndian>(0)?; // ext file attributes
        extra.write_u32::<LittleEndian>(0x0000_0003)?; // share access: read|write
        extra.write_u32::<LittleEndian>(disposition)?;
        extra.write_u32::<LittleEndian>(options)?;
        extra.write_u32::<LittleEndian>(0x0000_0002)?; // impersonation
        extra.write_u8(0)?; // security flags
        let params = andx(&extra);

        let mut data = Vec::new();
        let abs = data_offset_for(params.len());
        data.extend(std::iter::repeat(0u8).take(pad_to_align(abs, 2)));
        data.extend_from_slice(&name);
        Ok((params, data))
    }

    /// NT_CREATE_ANDX; returns the response and the FID.
    pub async fn nt_create(
        &mut self,
        path: &str,
        create_flags: u32,
        disposition: u32,
        options: u32,
    ) -> Result<(SmbMessage, u16)> {
        let (params, data) = Self::nt_create_body(path, create_flags, disposition, options)?;
        let resp = self.roundtrip(command::NT_CREATE_ANDX, params, data).await?;
        let fid = if resp.header.status == 0 {
            read_u16_le(&resp.commands[0].params, 5)?
        } else {
            0
        };
        Ok((resp, fid))
    }

    /// READ_ANDX; returns the response plus the decoded payload slice.
    pub async fn read(
        &mut self,
        fid: u16,
        offset: u32,
        max_count: u16,
    ) -> Result<(SmbMessage, Vec<u8>)> {
        let mut extra = Vec::with_capacity(16);
        extra.write_u16::<LittleEndian>(fid)?;
        extra.write_u32::<LittleEndian>(offset)?;
        extra.write_u16::<LittleEndian>(max_count)?;
        extra.write_u16::<LittleEndian>(max_count)?; // min count
        extra.write_u32::<LittleEndian>(0)?; // timeout / max count high
        extra.write_u16::<LittleEndian>(0)?; // remaining
        let params = andx(&extra);

        let resp = self.roundtrip(command::READ_ANDX, params, Vec::new()).await?;
        let payload = if resp.header.status == 0 {
            let cmd = &resp.commands[0];
            let len = read_u16_le(&cmd.params, 10)? as usize
                | ((read_u16_le(&cmd.params, 14)? as usize) << 16);
            cmd.data[1..1 + len].to_vec()
        } else {
            Vec::new()
        };
        Ok((resp, payload))
    }

    /// WRITE_ANDX at `offset`.
    pub async fn write(&mut self, fid: u16, offset: u32, payload: &[u8]) -> Result<SmbMessage> {
        let mut extra = Vec::with_capacity(24);
        extra.write_u16::<LittleEndian>(fid)?;
        extra.write_u32::<LittleEndian>(offset)?;
        extra.write_u32::<LittleEndian>(0)?; // timeout
        extra.write_u16::<LittleEndian>(0)?; // write mode
        extra.write_u16::<LittleEndian>(0)?; // remaining
        extra.write_u16::<LittleEndian>(0)?; // data length high
        extra.write_u16::<LittleEndian>(payload.len() as u16)?;
        let params_len = andx(&extra).len() + 2; // data offset still to come
        let data_offset = data_offset_for(params_len) + 1;
        let mut extra = extra;
        extra.write_u16::<LittleEndian>(data_offset as u16)?;
        let params = andx(&extra);

        let mut data = vec![0u8]; // pad
        data.extend_from_slice(payload);
        self.roundtrip(command::WRITE_ANDX, params, data).await
    }

    pub async fn close_file(&mut self, fid: u16, mtime: u32) -> Result<SmbMessage> {
        let mut params = Vec::with_capacity(6);
        params.write_u16::<LittleEndian>(fid)?;
        params.write_u32::<LittleEndian>(mtime)?;
        self.roundtrip(command::CLOSE, params, Vec::new()).await
    }

    pub async fn delete(&mut self, pattern: &str) -> Result<SmbMessage> {
        let mut params = Vec::with_capacity(2);
        params.write_u16::<LittleEndian>(0)?; // search attributes
        let mut data = vec![0x04];
        let abs = data_offset_for(params.len()) + data.len();
        data.extend(std::iter::repeat(0u8).take(pad_to_align(abs, 2)));
        data.extend_from_slice(&unicode_bytes_nul(pattern));
        self.roundtrip(command::DELETE, params, data).await
    }

    /// TRANSACTION2 with one setup word.
    pub async fn trans2(
        &mut self,
        subcommand: u16,
        t2_params: &[u8],
        t2_data: &[u8],
    ) -> Result<SmbMessage> {
        let params_len = 30;
        let base = data_offset_for(params_len);
        let pad1 = pad_to_align(base, 4);
        let param_offset = base + pad1;
        let pad2 = pad_to_align(param_offset + t2_params.len(), 4);
        let data_offset = param_offset + t2_params.len() + pad2;

        let mut params = Vec::with_capacity(params_len);
        params.write_u16::<LittleEndian>(t2_params.len() as u16)?;
        params.write_u16::<LittleEndian>(t2_data.len() as u16)?;
        params.write_u16::<LittleEndian>(256)?; // max parameter count
        params.write_u16::<LittleEndian>(0xFFFF)?; // max data count
        params.write_u8(0)?; // max setup count
        params.write_u8(0)?; // reserved
        params.write_u16::<LittleEndian>(0)?; // flags
        params.write_u32::<LittleEndian>(0)?; // timeout
        params.write_u16::<LittleEndian>(0)?; // reserved
        params.write_u16::<LittleEndian>(t2_params.len() as u16)?;
        params.write_u16::<LittleEndian>(param_offset as u16)?;
        params.write_u16::<LittleEndian>(t2_data.len() as u16)?;
        params.write_u16::<LittleEndian>(data_offset as u16)?;
        params.write_u8(1)?; // setup count
        params.write_u8(0)?; // reserved
        params.write_u16::<LittleEndian>(subcommand)?;

        let mut data = Vec::new();
        data.extend(std::iter::repeat(0u8).take(pad1));
        data.extend_from_slice(t2_params);
        data.extend(std::iter::repeat(0u8).take(pad2));
        data.extend_from_slice(t2_data);

        self.roundtrip(command::TRANSACTION2, params, data).await
    }

    /// Pull the Trans2 parameter and data blocks out of a response.
    pub fn trans2_blocks(resp: &SmbMessage) -> Result<(Vec<u8>, Vec<u8>)> {
        let cmd = &resp.commands[0];
        let param_count = read_u16_le(&cmd.params, 6)? as usize;
        let param_offset = read_u16_le(&cmd.params, 8)? as usize;
        let data_count = read_u16_le(&cmd.params, 12)? as usize;
        let data_offset = read_u16_le(&cmd.params, 14)? as usize;

        let p_start = param_offset - cmd.data_offset as usize;
        let d_start = data_offset - cmd.data_offset as usize;
        Ok((
            cmd.data[p_start..p_start + param_count].to_vec(),
            cmd.data[d_start..d_start + data_count].to_vec(),
        ))
    }

    /// FIND_FIRST2 for BOTH_DIRECTORY_INFO.
    pub async fn find_first2(&mut self, pattern: &str, count: u16) -> Result<SmbMessage> {
        let mut t2_params = Vec::new();
        t2_params.write_u16::<LittleEndian>(0x0016)?; // search attributes
        t2_params.write_u16::<LittleEndian>(count)?;
        t2_params.write_u16::<LittleEndian>(0)?; // flags
        t2_params.write_u16::<LittleEndian>(0x0104)?; // BOTH_DIRECTORY_INFO
        t2_params.write_u32::<LittleEndian>(0)?; // storage type
        t2_params.extend_from_slice(&unicode_bytes_nul(pattern));
        self.trans2(trans2::FIND_FIRST2, &t2_params, &[]).await
    }

    /// SET_FILE_INFORMATION with an NT pass-through level.
    pub async fn set_file_information(
        &mut self,
        fid: u16,
        level: u16,
        payload: &[u8],
    ) -> Result<SmbMessage> {
        let mut t2_params = Vec::new();
        t2_params.write_u16::<LittleEndian>(fid)?;
        t2_params.write_u16::<LittleEndian>(level)?;
        t2_params.write_u16::<LittleEndian>(0)?; // reserved
        self.trans2(trans2::SET_FILE_INFORMATION, &t2_params, payload)
            .await
    }

    /// QUERY_PATH_INFORMATION.
    pub async fn query_path_information(&mut self, path: &str, level: u16) -> Result<SmbMessage> {
        let mut t2_params = Vec::new();
        t2_params.write_u16::<LittleEndian>(level)?;
        t2_params.write_u32::<LittleEndian>(0)?; // reserved
        t2_params.extend_from_slice(&unicode_bytes_nul(path));
        self.trans2(trans2::QUERY_PATH_INFORMATION, &t2_params, &[])
            .await
    }

    pub async fn echo(&mut self, count: u16, payload: &[u8]) -> Result<Vec<SmbMessage>> {
        let mut params = Vec::with_capacity(2);
        params.write_u16::<LittleEndian>(count)?;
        let mut msg = self.request(command::ECHO);
        let mut cmd = SmbCommand::new(command::ECHO);
        cmd.set_body(params, payload.to_vec());
        msg.commands.push(cmd);
        self.send(&mut msg).await?;

        let mut responses = Vec::with_capacity(count as usize);
        for _ in 0..count {
            responses.push(self.recv().await?);
        }
        Ok(responses)
    }
}
