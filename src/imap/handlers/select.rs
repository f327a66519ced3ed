//! SELECT and EXAMINE command handler.
//!
//! Opens a mailbox and responds with metadata. The key pieces are:
//!
//! - `* N EXISTS` -- total number of messages in the mailbox.
//! - `* OK [UIDVALIDITY V]` -- changes when the mailbox is deleted and
//!   recreated, telling clients to drop cached UIDs.
//! - `* OK [UIDNEXT N]` -- the UID the next message will get.
//!
//! INBOX is created on demand; any other mailbox must exist. A failed
//! SELECT leaves the session with no mailbox selected.

use super::tagged_error;
use crate::flag::Flag;
use crate::imap::state::Selection;
use crate::io::write_line;
use crate::store::{MailboxName, MessageStore};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle SELECT, or EXAMINE when `read_only`. Returns the selection.
pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    principal: &str,
    mailbox_name: &str,
    read_only: bool,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<Option<Selection>> {
    let status = if MailboxName::from(mailbox_name).is_inbox() {
        Ok(store.create_mailbox_if_absent(principal, mailbox_name))
    } else {
        store.status(principal, mailbox_name)
    };
    let status = status.and_then(|status| {
        let live = store.list_messages(principal, status.name.as_str())?;
        Ok((status, live))
    });
    let (status, live) = match status {
        Ok(found) => found,
        Err(e) => {
            write_line(stream, &tagged_error(tag, &e)).await?;
            return Ok(None);
        }
    };

    let system: Vec<&str> = Flag::SYSTEM.iter().map(Flag::as_imap_str).collect();
    let system = system.join(" ");

    // RFC 3501 Section 6.3.1: required FLAGS, EXISTS and RECENT
    write_line(stream, &format!("* FLAGS ({system})\r\n")).await?;
    write_line(stream, &format!("* {} EXISTS\r\n", live.len())).await?;
    write_line(stream, "* 0 RECENT\r\n").await?;

    if let Some(pos) = live.iter().position(|m| !m.has_flag(&Flag::Seen)).map(|idx| idx + 1) {
        let line = format!("* OK [UNSEEN {pos}] Message {pos} is first unseen\r\n");
        write_line(stream, &line).await?;
    }
    let line = format!("* OK [UIDVALIDITY {}] UIDs valid\r\n", status.uid_validity);
    write_line(stream, &line).await?;
    let line = format!("* OK [UIDNEXT {}] Predicted next UID\r\n", status.uid_next);
    write_line(stream, &line).await?;

    let (perm, access, command) = if read_only {
        let perm = "* OK [PERMANENTFLAGS ()] No permanent flags permitted\r\n".to_string();
        (perm, "READ-ONLY", "EXAMINE")
    } else {
        let perm = format!("* OK [PERMANENTFLAGS ({system} \\*)] Limited\r\n");
        (perm, "READ-WRITE", "SELECT")
    };
    write_line(stream, &perm).await?;

    let resp = format!("{tag} OK [{access}] {command} completed\r\n");
    write_line(stream, &resp).await?;

    Ok(Some(Selection::new(principal, status.name, read_only, &live)))
}
