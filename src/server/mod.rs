//! SMB1 server: listener, configuration, and share registry

pub mod connection;
pub mod dispatcher;
pub mod handlers;

use crate::auth::Authenticator;
use crate::error::{Error, Result};
use crate::transport::TcpTransport;
use crate::vfs::Share;
use connection::ConnectionHandler;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name announced in NEGOTIATE
    pub server_name: String,
    /// Workgroup/domain name
    pub workgroup: String,
    /// NativeOS string in SESSION_SETUP_ANDX replies
    pub native_os: String,
    /// NativeLanMan string in SESSION_SETUP_ANDX replies
    pub native_lanman: String,
    /// Largest client buffer announced in NEGOTIATE
    pub max_buffer_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "SMBGATE".to_string(),
            workgroup: "WORKGROUP".to_string(),
            native_os: "Unix".to_string(),
            native_lanman: "smbgate".to_string(),
            max_buffer_size: 16644,
        }
    }
}

/// Shared server state: configuration, authenticator, exported shares.
pub struct ServerContext {
    pub config: ServerConfig,
    pub auth: Authenticator,
    shares: RwLock<HashMap<String, Arc<dyn Share>>>,
}

impl ServerContext {
    pub fn new(config: ServerConfig, auth: Authenticator) -> Self {
        Self {
            config,
            auth,
            shares: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_share(&self, share: Arc<dyn Share>) {
        let key = share.name().to_uppercase();
        self.shares
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, share);
    }

    pub fn share(&self, name: &str) -> Option<Arc<dyn Share>> {
        self.shares
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&name.to_uppercase())
            .cloned()
    }

    pub fn share_names(&self) -> Vec<String> {
        self.shares
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

/// The SMB1 server.
pub struct SmbServer {
    context: Arc<ServerContext>,
}

impl SmbServer {
    pub fn new(config: ServerConfig, auth: Authenticator) -> Self {
        Self {
            context: Arc::new(ServerContext::new(config, auth)),
        }
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.context)
    }

    pub fn add_share(&self, share: Arc<dyn Share>) {
        self.context.add_share(share);
    }

    /// Accept loop. Each connection runs on its own task; a panicking
    /// handler is a server defect and terminates the process after the
    /// fault is logged, while ordinary connection errors only end that
    /// connection.
    pub async fn run(&self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, server = %self.context.config.server_name, "SMB server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            debug!(%remote_addr, "new connection");

            let context = Arc::clone(&self.context);
            let worker = tokio::spawn(async move {
                let transport = TcpTransport::from_stream(stream);
                let mut handler = ConnectionHandler::new(transport, context);
                handler.handle().await
            });

            tokio::spawn(async move {
                match worker.await {
                    Ok(Ok(())) => debug!(%remote_addr, "connection closed"),
                    Ok(Err(e)) => debug!(%remote_addr, error = %e, "connection ended with error"),
                    Err(join_err) if join_err.is_panic() => {
                        error!(%remote_addr, "handler fault, terminating server");
                        std::process::exit(70);
                    }
                    Err(_) => {}
                }
            });
        }
    }

    /// Run on the direct-TCP SMB port (445).
    pub async fn run_standard(&self) -> Result<()> {
        let addr = "0.0.0.0:445"
            .parse()
            .map_err(|e| Error::InvalidParameter(format!("invalid address: {}", e)))?;
        self.run(addr).await
    }
}
