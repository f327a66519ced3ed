//! Listener and dispatcher
//!
//! [`MailServer::start`] binds one TCP listener per protocol and spawns
//! an accept loop for each. Every accepted connection gets its own task
//! running the protocol's session loop against the shared store.
//!
//! ```text
//!   MailServer::start
//!       |
//!       +-- SMTP accept loop --> smtp::run_session (one task each)
//!       |
//!       +-- IMAP accept loop --> imap::run_session (one task each)
//!       |
//!   ServerHandle::shutdown
//!       cancels every session, waits for the loops, saves the store
//! ```
//!
//! The number of open sessions is bounded per protocol. A connection
//! over the bound still gets an answer: the protocol's "too busy"
//! response, then the connection is closed.

use crate::config::ServerConfig;
use crate::error::Result;
use crate::store::MessageStore;
use crate::{imap, smtp};
use futures::future::join_all;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Smtp,
    Imap,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smtp => f.write_str("SMTP"),
            Self::Imap => f.write_str("IMAP"),
        }
    }
}

/// State every accept loop and session task shares.
struct Shared {
    store: Arc<MessageStore>,
    config: ServerConfig,
    cancel: CancellationToken,
}

/// Entry point for running the SMTP and IMAP listeners.
pub struct MailServer;

impl MailServer {
    /// Bind both listeners and start accepting connections.
    ///
    /// Ports set to `0` are assigned by the OS; the handle reports the
    /// addresses actually bound.
    pub async fn start(config: ServerConfig, store: Arc<MessageStore>) -> Result<ServerHandle> {
        let smtp_listener = TcpListener::bind((config.host.as_str(), config.smtp_port)).await?;
        let imap_listener = TcpListener::bind((config.host.as_str(), config.imap_port)).await?;
        let smtp_addr = smtp_listener.local_addr()?;
        let imap_addr = imap_listener.local_addr()?;

        let shared = Arc::new(Shared {
            store,
            config,
            cancel: CancellationToken::new(),
        });

        info!(%smtp_addr, %imap_addr, "mailsink listening");

        let loops = vec![
            tokio::spawn(accept_loop(smtp_listener, Protocol::Smtp, Arc::clone(&shared))),
            tokio::spawn(accept_loop(imap_listener, Protocol::Imap, Arc::clone(&shared))),
        ];

        Ok(ServerHandle {
            smtp_addr,
            imap_addr,
            shared,
            loops,
        })
    }
}

/// A running server.
///
/// Dropping the handle stops the listeners without waiting for them;
/// [`ServerHandle::shutdown`] also waits and saves the store.
pub struct ServerHandle {
    smtp_addr: SocketAddr,
    imap_addr: SocketAddr,
    shared: Arc<Shared>,
    loops: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    #[must_use]
    pub const fn smtp_addr(&self) -> SocketAddr {
        self.smtp_addr
    }

    #[must_use]
    pub const fn imap_addr(&self) -> SocketAddr {
        self.imap_addr
    }

    /// The store every session reads and writes.
    #[must_use]
    pub fn store(&self) -> &Arc<MessageStore> {
        &self.shared.store
    }

    /// Stop accepting, end every open session and wait for them.
    ///
    /// Sessions are told to go away with their protocol's shutdown
    /// response. When a store path is configured the store is saved
    /// once all sessions are gone.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down");
        self.shared.cancel.cancel();

        for res in join_all(std::mem::take(&mut self.loops)).await {
            if let Err(e) = res {
                warn!("Accept loop failed: {e}");
            }
        }

        if let Some(path) = &self.shared.config.store_path {
            self.shared.store.save(path)?;
        }
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

/// Accept connections until shutdown, then wait for this listener's
/// sessions to finish.
async fn accept_loop(listener: TcpListener, protocol: Protocol, shared: Arc<Shared>) {
    let permits = Arc::new(Semaphore::new(shared.config.max_sessions));
    let mut sessions = JoinSet::new();

    loop {
        let accepted = tokio::select! {
            () = shared.cancel.cancelled() => break,
            res = listener.accept() => res,
        };
        let (stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                warn!(%protocol, "Accept failed: {e}");
                continue;
            }
        };

        // Reap sessions that already ended.
        while sessions.try_join_next().is_some() {}

        let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
            warn!(%protocol, %peer, "Session limit reached, rejecting connection");
            let hostname = shared.config.hostname.clone();
            sessions.spawn(reject(stream, protocol, hostname));
            continue;
        };

        info!(%protocol, %peer, "Accepted connection");
        let shared = Arc::clone(&shared);
        sessions.spawn(async move {
            let _permit = permit;
            let res = match protocol {
                Protocol::Smtp => {
                    let client = peer.ip().to_string();
                    let Shared { store, config, cancel } = &*shared;
                    smtp::run_session(stream, &client, store, config, cancel).await
                }
                Protocol::Imap => {
                    imap::run_session(stream, &shared.store, &shared.config, &shared.cancel).await
                }
            };
            match res {
                Ok(()) => debug!(%protocol, %peer, "Session closed"),
                Err(e) => warn!(%protocol, %peer, "Session ended: {e}"),
            }
        });
    }

    info!(%protocol, "Listener stopped");
    while sessions.join_next().await.is_some() {}
}

/// Tell a client over the session bound to go away.
async fn reject(mut stream: TcpStream, protocol: Protocol, hostname: String) {
    let resp = match protocol {
        Protocol::Smtp => format!("421 {hostname} Too many connections, try again later\r\n"),
        Protocol::Imap => "* BYE Too many connections\r\n".to_string(),
    };
    if let Err(e) = stream.write_all(resp.as_bytes()).await {
        debug!(%protocol, "Could not send rejection: {e}");
    }
    let _ = stream.shutdown().await;
}
