//! TCP transport with NetBIOS session framing
//!
//! Delivers whole SMB message buffers to the connection layer and frames
//! outgoing replies. The same framing applies on port 445 (direct TCP) and
//! port 139 (after the session request handshake).

use crate::error::{Error, Result};
use crate::netbios::{NetBiosHeader, NetBiosMessage};
use crate::protocol::NetBiosMessageType;
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub struct TcpTransport {
    stream: Option<TcpStream>,
    read_buffer: BytesMut,
    remote_addr: Option<SocketAddr>,
}

impl TcpTransport {
    pub fn from_stream(stream: TcpStream) -> Self {
        let remote_addr = stream.peer_addr().ok();
        Self {
            stream: Some(stream),
            read_buffer: BytesMut::with_capacity(65536),
            remote_addr,
        }
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Send one payload with NetBIOS session-message framing.
    pub async fn send_netbios_message(&mut self, data: &[u8]) -> Result<()> {
        let msg = NetBiosMessage::session_message(data.to_vec())?;
        self.send_raw(&msg.to_bytes()).await
    }

    /// Send a pre-framed NetBIOS message (responses to session requests).
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        match self.stream.as_mut() {
            Some(stream) => {
                stream.write_all(bytes).await?;
                stream.flush().await?;
                Ok(())
            }
            None => Err(Error::ConnectionError("not connected".to_string())),
        }
    }

    /// Receive the next NetBIOS message, skipping keepalives. Returns the
    /// message type and its payload; session messages carry a whole SMB
    /// buffer.
    pub async fn receive_netbios_message(&mut self) -> Result<(NetBiosMessageType, Vec<u8>)> {
        loop {
            while self.read_buffer.len() < NetBiosHeader::SIZE {
                self.read_more().await?;
            }

            let header = NetBiosHeader::parse(&self.read_buffer)?;
            let total_size = NetBiosHeader::SIZE + header.length as usize;
            while self.read_buffer.len() < total_size {
                self.read_more().await?;
            }

            let message_bytes = self.read_buffer.split_to(total_size);
            if header.message_type == NetBiosMessageType::Keepalive {
                continue;
            }
            let message = NetBiosMessage::parse(&message_bytes)?;
            return Ok((header.message_type, message.payload));
        }
    }

    async fn read_more(&mut self) -> Result<usize> {
        match self.stream.as_mut() {
            Some(stream) => {
                let mut temp = [0u8; 8192];
                let n = stream.read(&mut temp).await?;
                if n == 0 {
                    return Err(Error::ConnectionClosed);
                }
                self.read_buffer.put_slice(&temp[..n]);
                Ok(n)
            }
            None => Err(Error::ConnectionError("not connected".to_string())),
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        self.read_buffer.clear();
        Ok(())
    }
}
