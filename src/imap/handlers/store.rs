//! STORE and UID STORE command handler.
//!
//! Modifies flags on the addressed messages. Supports:
//!
//! - `+FLAGS (...)` -- add flags
//! - `-FLAGS (...)` -- remove flags
//! - `FLAGS (...)` -- replace flags
//!
//! Responds with `* N FETCH (FLAGS (...))` per modified message, then
//! the tagged OK. The `.SILENT` forms skip the untagged responses.

use super::tagged_error;
use crate::error::Error;
use crate::flag::{Flag, FlagSet, StoreMode, to_imap_list};
use crate::imap::sequence::{Addressing, resolve};
use crate::imap::state::Selection;
use crate::io::write_line;
use crate::store::MessageStore;
use imap_codec::imap_types::flag::{Flag as WireFlag, StoreResponse, StoreType};
use imap_codec::imap_types::sequence::SequenceSet;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Parsed STORE command arguments.
pub struct StoreArgs<'a> {
    pub sequence_set: &'a SequenceSet,
    pub kind: &'a StoreType,
    pub response: &'a StoreResponse,
    pub flags: &'a [WireFlag<'a>],
}

/// Handle STORE, or UID STORE when `uid` is set.
pub async fn handle_store<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    args: &StoreArgs<'_>,
    uid: bool,
    selection: &Selection,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    if selection.read_only {
        let resp = format!("{tag} NO Mailbox is read-only\r\n");
        return write_line(stream, &resp).await;
    }

    let mode = match args.kind {
        StoreType::Replace => StoreMode::Replace,
        StoreType::Add => StoreMode::Add,
        StoreType::Remove => StoreMode::Remove,
    };
    let flags: FlagSet = args
        .flags
        .iter()
        .map(|f| Flag::parse(&f.to_string()))
        .collect();

    let mailbox = selection.mailbox.as_str();
    if let Err(e) = store.status(&selection.principal, mailbox) {
        return write_line(stream, &tagged_error(tag, &e)).await;
    }
    let addressing = Addressing::from_uid_flag(uid);
    let indices = match resolve(args.sequence_set, &selection.known_uids, addressing) {
        Ok(indices) => indices,
        Err(e) => return write_line(stream, &tagged_error(tag, &e)).await,
    };

    // Update every flag set first, then report outside the store.
    let mut results = Vec::with_capacity(indices.len());
    for idx in indices {
        let message_uid = selection.known_uids[idx];
        match store.set_flags(&selection.principal, mailbox, message_uid, mode, &flags) {
            Ok(updated) => results.push((idx + 1, message_uid, updated)),
            // Expunged by another session.
            Err(Error::NotFound(_)) => {}
            Err(e) => return write_line(stream, &tagged_error(tag, &e)).await,
        }
    }

    if !matches!(args.response, StoreResponse::Silent) {
        for (seq, message_uid, updated) in &results {
            let uid_item = if uid { format!("UID {message_uid} ") } else { String::new() };
            let line = format!("* {seq} FETCH ({uid_item}FLAGS {})\r\n", to_imap_list(updated));
            write_line(stream, &line).await?;
        }
    }

    let command = if uid { "UID STORE" } else { "STORE" };
    let resp = format!("{tag} OK {command} completed\r\n");
    write_line(stream, &resp).await
}
