//! smbgate server binary
//!
//! Exposes HTTP-manifest shares (and optional scratch shares) over SMB1.

use clap::Parser;
use smbgate::auth::Authenticator;
use smbgate::server::{ServerConfig, SmbServer};
use smbgate::vfs::memory::MemoryShare;
use smbgate::webfs::{ShareManifest, WebShare};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "smbgate")]
#[command(about = "Read-only SMB1 gateway for HTTP content", long_about = None)]
struct Args {
    /// Server name
    #[arg(short = 'n', long, default_value = "SMBGATE")]
    server_name: String,

    /// Workgroup/domain name
    #[arg(short = 'w', long, default_value = "WORKGROUP")]
    workgroup: String,

    /// Bind address
    #[arg(short = 'b', long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on (445 direct TCP, 139 NetBIOS)
    #[arg(short = 'p', long, default_value = "445")]
    port: u16,

    /// Web share definitions, name=manifest.json (can be repeated)
    #[arg(short = 's', long = "share", value_parser = parse_web_share)]
    shares: Vec<WebShareDef>,

    /// Account credentials, name:password (can be repeated)
    #[arg(short = 'u', long = "user", value_parser = parse_user)]
    users: Vec<UserDef>,

    /// Allow guest logons for unknown accounts
    #[arg(long, default_value = "true")]
    allow_guest: bool,

    /// Add an empty in-memory scratch share with this name
    #[arg(long)]
    scratch_share: Option<String>,

    /// Log filter
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone)]
struct WebShareDef {
    name: String,
    manifest: PathBuf,
}

#[derive(Debug, Clone)]
struct UserDef {
    name: String,
    password: String,
}

fn parse_web_share(s: &str) -> Result<WebShareDef, String> {
    let (name, manifest) = s
        .split_once('=')
        .ok_or_else(|| "share format: name=manifest.json".to_string())?;
    Ok(WebShareDef {
        name: name.to_string(),
        manifest: PathBuf::from(manifest),
    })
}

fn parse_user(s: &str) -> Result<UserDef, String> {
    let (name, password) = s
        .split_once(':')
        .ok_or_else(|| "user format: name:password".to_string())?;
    Ok(UserDef {
        name: name.to_string(),
        password: password.to_string(),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut auth = Authenticator::new(args.allow_guest);
    for user in &args.users {
        auth.add_user(&user.name, &user.password)?;
    }

    let config = ServerConfig {
        server_name: args.server_name.clone(),
        workgroup: args.workgroup.clone(),
        ..ServerConfig::default()
    };
    let server = SmbServer::new(config, auth);

    for def in &args.shares {
        let json = std::fs::read_to_string(&def.manifest)?;
        let manifest = ShareManifest::from_json(&json)?;
        tracing::info!(share = %def.name, manifest = %def.manifest.display(), "adding web share");
        server.add_share(Arc::new(WebShare::new(&def.name, manifest)?));
    }

    if let Some(name) = &args.scratch_share {
        tracing::info!(share = %name, "adding scratch share");
        server.add_share(Arc::new(MemoryShare::new(name)));
    }

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    tracing::info!(%addr, "starting smbgate");
    tracing::info!("test with: smbclient //localhost/<share> -p {} -N", args.port);

    tokio::spawn(async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        std::process::exit(0);
    });

    server.run(addr).await?;
    Ok(())
}
