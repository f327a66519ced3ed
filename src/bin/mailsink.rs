#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Run a disposable SMTP/IMAP mail server

use clap::Parser;
use mailsink::{MailServer, MessageStore, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailsink")]
#[command(about = "Disposable SMTP/IMAP mail server for integration testing")]
struct Args {
    /// Address to bind both listeners to
    #[arg(long)]
    host: Option<String>,

    /// SMTP port (0 picks a free port)
    #[arg(long)]
    smtp_port: Option<u16>,

    /// IMAP port (0 picks a free port)
    #[arg(long)]
    imap_port: Option<u16>,

    /// Maximum concurrent sessions per protocol
    #[arg(long)]
    max_sessions: Option<usize>,

    /// JSON snapshot to load at start and write on exit
    #[arg(long)]
    store: Option<PathBuf>,
}

impl Args {
    /// Flags override whatever the environment configured.
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.smtp_port {
            config.smtp_port = port;
        }
        if let Some(port) = self.imap_port {
            config.imap_port = port;
        }
        if let Some(max) = self.max_sessions {
            config.max_sessions = max;
        }
        if let Some(path) = self.store {
            config.store_path = Some(path);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = args.apply(ServerConfig::from_env()?);

    let store = match &config.store_path {
        Some(path) if path.exists() => MessageStore::load(path)?,
        _ => MessageStore::new(),
    };

    let handle = MailServer::start(config, Arc::new(store)).await?;
    println!("SMTP listening on {}", handle.smtp_addr());
    println!("IMAP listening on {}", handle.imap_addr());

    tokio::signal::ctrl_c().await?;
    info!("Interrupted");
    handle.shutdown().await?;
    Ok(())
}
