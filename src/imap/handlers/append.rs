//! APPEND command handler.
//!
//! Stores the message literal at the end of a mailbox, with the given
//! flags and internal date. A missing mailbox answers
//! `NO [TRYCREATE]` (RFC 3501 Section 6.3.11); only INBOX is created on
//! demand. Appending to the selected mailbox reports the new `EXISTS`
//! right away.

use super::{report_changes, tagged_error};
use crate::flag::{Flag, FlagSet};
use crate::imap::state::Selection;
use crate::io::write_line;
use crate::store::{MailboxName, MessageStore};
use chrono::Utc;
use imap_codec::imap_types::datetime::DateTime;
use imap_codec::imap_types::flag::Flag as WireFlag;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Parsed APPEND command arguments.
pub struct AppendArgs<'a> {
    pub mailbox: &'a str,
    pub flags: &'a [WireFlag<'a>],
    pub date: Option<&'a DateTime>,
    pub message: &'a [u8],
}

/// Handle APPEND. `selection` is the session's selected mailbox, if any.
pub async fn handle_append<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    principal: &str,
    args: &AppendArgs<'_>,
    selection: Option<&mut Selection>,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let target = MailboxName::from(args.mailbox);
    if target.is_inbox() {
        store.create_mailbox_if_absent(principal, args.mailbox);
    } else if store.status(principal, args.mailbox).is_err() {
        let resp = format!("{tag} NO [TRYCREATE] Mailbox not found\r\n");
        return write_line(stream, &resp).await;
    }

    let flags: FlagSet = args.flags.iter().map(|f| Flag::parse(&f.to_string())).collect();
    let received = args
        .date
        .map_or_else(Utc::now, |date| date.as_ref().with_timezone(&Utc));

    let raw = args.message.to_vec();
    if let Err(e) = store.append_with(principal, args.mailbox, raw.into(), flags, received) {
        return write_line(stream, &tagged_error(tag, &e)).await;
    }

    if let Some(selection) = selection
        && selection.mailbox == target
    {
        report_changes(selection, store, stream, false).await?;
    }

    let resp = format!("{tag} OK APPEND completed\r\n");
    write_line(stream, &resp).await
}
