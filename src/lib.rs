//! Disposable SMTP/IMAP mail server for integration testing
//!
//! mailsink accepts mail over SMTP, files one copy into the INBOX of
//! every recipient and serves the result over IMAP. Any credentials are
//! accepted: a login name or a recipient address picks the account.
//!
//! ```no_run
//! use mailsink::{MailServer, MessageStore, ServerConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> mailsink::Result<()> {
//! let handle = MailServer::start(ServerConfig::ephemeral(), Arc::new(MessageStore::new())).await?;
//! println!("SMTP on {}, IMAP on {}", handle.smtp_addr(), handle.imap_addr());
//!
//! // ... send mail, read it back ...
//!
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod flag;
mod io;
mod server;
mod store;

pub mod imap;
pub mod smtp;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use flag::{Flag, FlagSet, StoreMode};
pub use server::{MailServer, ServerHandle};
pub use store::{ExpungedMessage, MailboxName, MailboxStatus, Message, MessageStore, principal_of};
