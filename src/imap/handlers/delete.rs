//! DELETE command handler.
//!
//! Deleting a mailbox discards its messages. A later CREATE of the same
//! name starts over with a new UIDVALIDITY.

use super::tagged_error;
use crate::io::write_line;
use crate::store::MessageStore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::debug;

pub async fn handle_delete<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    principal: &str,
    mailbox_name: &str,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let resp = match store.delete_mailbox(principal, mailbox_name) {
        Ok(()) => {
            debug!(principal, mailbox = mailbox_name, "Deleted mailbox");
            format!("{tag} OK DELETE completed\r\n")
        }
        Err(e) => tagged_error(tag, &e),
    };
    write_line(stream, &resp).await
}
