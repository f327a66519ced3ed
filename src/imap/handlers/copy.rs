//! COPY and UID COPY command handler.
//!
//! Copies messages from the selected mailbox to a destination mailbox.
//! The originals stay where they are; the copies keep their flags and
//! get new UIDs in the destination.

use super::tagged_error;
use crate::imap::sequence::{Addressing, resolve};
use crate::imap::state::Selection;
use crate::io::write_line;
use crate::store::MessageStore;
use imap_codec::imap_types::sequence::SequenceSet;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle COPY, or UID COPY when `uid` is set.
pub async fn handle_copy<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    sequence_set: &SequenceSet,
    dest_mailbox: &str,
    uid: bool,
    selection: &Selection,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    // RFC 3501 Section 6.4.7: a missing destination is a hint to create it
    if store.status(&selection.principal, dest_mailbox).is_err() {
        let resp = format!("{tag} NO [TRYCREATE] Destination mailbox not found\r\n");
        return write_line(stream, &resp).await;
    }

    let source = selection.mailbox.as_str();
    let known = &selection.known_uids;
    // UIDs expunged elsewhere are skipped by the store.
    let uids: Vec<u32> = match resolve(sequence_set, known, Addressing::from_uid_flag(uid)) {
        Ok(indices) => indices.into_iter().map(|idx| known[idx]).collect(),
        Err(e) => return write_line(stream, &tagged_error(tag, &e)).await,
    };

    let command = if uid { "UID COPY" } else { "COPY" };
    let resp = match store.copy_messages(&selection.principal, source, &uids, dest_mailbox) {
        Ok(_) => format!("{tag} OK {command} completed\r\n"),
        Err(e) => tagged_error(tag, &e),
    };
    write_line(stream, &resp).await
}
