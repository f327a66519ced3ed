//! EXPUNGE command handler.
//!
//! Permanently removes all messages with the `\Deleted` flag from the
//! selected mailbox. Sends `* N EXPUNGE` for each removed message,
//! where N is its position in the client's view. Messages another
//! session expunged since the last report are included. Notifications
//! go out in decreasing order so no position shifts under the client
//! between two of them.

use super::{report_changes, tagged_error};
use crate::imap::state::Selection;
use crate::io::write_line;
use crate::store::MessageStore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the EXPUNGE command.
pub async fn handle_expunge<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    selection: &mut Selection,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    if selection.read_only {
        let resp = format!("{tag} NO Mailbox is read-only\r\n");
        return write_line(stream, &resp).await;
    }

    if let Err(e) = store.expunge(&selection.principal, selection.mailbox.as_str()) {
        return write_line(stream, &tagged_error(tag, &e)).await;
    }
    report_changes(selection, store, stream, true).await?;

    let resp = format!("{tag} OK EXPUNGE completed\r\n");
    write_line(stream, &resp).await
}
