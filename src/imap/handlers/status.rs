//! STATUS command handler.
//!
//! Reports counters for a mailbox without selecting it:
//!
//! ```text
//! * STATUS "INBOX" (MESSAGES 2 UIDNEXT 3 UNSEEN 1)
//! A4 OK STATUS completed
//! ```

use super::tagged_error;
use crate::imap::view::quoted;
use crate::io::write_line;
use crate::store::MessageStore;
use imap_codec::imap_types::status::StatusDataItemName;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the STATUS command. Items the server does not track are
/// left out of the response.
pub async fn handle_status<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    principal: &str,
    mailbox_name: &str,
    items: &[StatusDataItemName],
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let status = match store.status(principal, mailbox_name) {
        Ok(status) => status,
        Err(e) => return write_line(stream, &tagged_error(tag, &e)).await,
    };

    let values: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            StatusDataItemName::Messages => Some(format!("MESSAGES {}", status.exists)),
            StatusDataItemName::Recent => Some("RECENT 0".to_string()),
            StatusDataItemName::UidNext => Some(format!("UIDNEXT {}", status.uid_next)),
            StatusDataItemName::UidValidity => Some(format!("UIDVALIDITY {}", status.uid_validity)),
            StatusDataItemName::Unseen => Some(format!("UNSEEN {}", status.unseen)),
            _ => None,
        })
        .collect();

    let line = format!(
        "* STATUS {} ({})\r\n",
        quoted(status.name.as_str()),
        values.join(" ")
    );
    write_line(stream, &line).await?;
    let resp = format!("{tag} OK STATUS completed\r\n");
    write_line(stream, &resp).await
}
