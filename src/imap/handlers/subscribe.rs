//! SUBSCRIBE and UNSUBSCRIBE command handlers.
//!
//! The subscribed set is what LSUB reports. Only existing mailboxes can
//! be subscribed to or unsubscribed from.

use super::tagged_error;
use crate::io::write_line;
use crate::store::MessageStore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle SUBSCRIBE.
pub async fn handle_subscribe<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    principal: &str,
    mailbox: &str,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    mark(tag, "SUBSCRIBE", principal, mailbox, true, store, stream).await
}

/// Handle UNSUBSCRIBE.
pub async fn handle_unsubscribe<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    principal: &str,
    mailbox: &str,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    mark(tag, "UNSUBSCRIBE", principal, mailbox, false, store, stream).await
}

async fn mark<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    command: &str,
    principal: &str,
    mailbox: &str,
    subscribed: bool,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let resp = match store.set_subscribed(principal, mailbox, subscribed) {
        Ok(()) => format!("{tag} OK {command} completed\r\n"),
        Err(e) => tagged_error(tag, &e),
    };
    write_line(stream, &resp).await
}
