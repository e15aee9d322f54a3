//! Loopback server/client harness

use super::smb1_helper::TestClient;
use crate::auth::Authenticator;
use crate::error::Result;
use crate::server::connection::ConnectionHandler;
use crate::server::{ServerConfig, ServerContext};
use crate::transport::TcpTransport;
use crate::vfs::memory::MemoryShare;
use crate::vfs::Share;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub struct TestContext {
    pub client: TestClient,
    pub context: Arc<ServerContext>,
    server_task: JoinHandle<Result<()>>,
}

impl TestContext {
    /// Server with a seeded in-memory `public` share, one account
    /// (`User`/`Password`), and guest access enabled.
    pub async fn new() -> Result<Self> {
        let mut auth = Authenticator::new(true);
        auth.add_user("User", "Password")?;

        let share = MemoryShare::new("public");
        share.add_file("tiny.txt", b"abc");
        share.add_file("docs\\alpha.txt", b"alpha contents");
        share.add_file("docs\\beta.md", b"beta");

        Self::with_parts(auth, vec![Arc::new(share)]).await
    }

    pub async fn with_parts(auth: Authenticator, shares: Vec<Arc<dyn Share>>) -> Result<Self> {
        let context = Arc::new(ServerContext::new(ServerConfig::default(), auth));
        for share in shares {
            context.add_share(share);
        }

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let server_context = Arc::clone(&context);
        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await?;
            let transport = TcpTransport::from_stream(stream);
            let mut handler = ConnectionHandler::new(transport, server_context);
            handler.handle().await
        });

        let stream = TcpStream::connect(addr).await?;
        let client = TestClient::new(TcpTransport::from_stream(stream));

        Ok(Self {
            client,
            context,
            server_task,
        })
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.client.close().await?;
        let _ = self.server_task.await;
        Ok(())
    }
}
