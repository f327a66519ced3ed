//! MOVE and UID MOVE command handler (RFC 6851).
//!
//! Like COPY followed by an expunge of the originals, but atomic for
//! the moved messages and without touching their `\Deleted` flags. The
//! removals are reported as `* N EXPUNGE` before the tagged OK:
//!
//! ```text
//! C: A3 MOVE 2:3 Archive
//! S: * 3 EXPUNGE
//! S: * 2 EXPUNGE
//! S: A3 OK MOVE completed
//! ```

use super::{report_changes, tagged_error};
use crate::imap::sequence::{Addressing, resolve};
use crate::imap::state::Selection;
use crate::io::write_line;
use crate::store::MessageStore;
use imap_codec::imap_types::sequence::SequenceSet;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle MOVE, or UID MOVE when `uid` is set.
pub async fn handle_move<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    sequence_set: &SequenceSet,
    dest_mailbox: &str,
    uid: bool,
    selection: &mut Selection,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    if selection.read_only {
        let resp = format!("{tag} NO Mailbox is read-only\r\n");
        return write_line(stream, &resp).await;
    }
    if store.status(&selection.principal, dest_mailbox).is_err() {
        let resp = format!("{tag} NO [TRYCREATE] Destination mailbox not found\r\n");
        return write_line(stream, &resp).await;
    }

    let known = &selection.known_uids;
    let uids: Vec<u32> = match resolve(sequence_set, known, Addressing::from_uid_flag(uid)) {
        Ok(indices) => indices.into_iter().map(|idx| known[idx]).collect(),
        Err(e) => return write_line(stream, &tagged_error(tag, &e)).await,
    };

    let source = selection.mailbox.as_str();
    if let Err(e) = store.move_messages(&selection.principal, source, &uids, dest_mailbox) {
        return write_line(stream, &tagged_error(tag, &e)).await;
    }
    report_changes(selection, store, stream, true).await?;

    let command = if uid { "UID MOVE" } else { "MOVE" };
    let resp = format!("{tag} OK {command} completed\r\n");
    write_line(stream, &resp).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::{Flag, FlagSet, StoreMode};
    use crate::imap::handlers::testing::{RAW, inbox_selection, output, store_with};

    async fn run_move(
        tag: &str,
        set: &str,
        dest: &str,
        uid: bool,
        selection: &mut Selection,
        store: &MessageStore,
    ) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);
        let set = SequenceSet::try_from(set).unwrap();

        handle_move(tag, &set, dest, uid, selection, store, &mut stream)
            .await
            .unwrap();
        drop(stream);
        output(client).await
    }

    fn uids(store: &MessageStore, mailbox: &str) -> Vec<u32> {
        store
            .list_messages("foo", mailbox)
            .unwrap()
            .iter()
            .map(|m| m.uid)
            .collect()
    }

    #[tokio::test]
    async fn moves_and_reports_expunges() {
        let store = store_with(&[RAW, RAW, RAW]);
        store.create_mailbox("foo", "Archive").unwrap();
        let flagged: FlagSet = [Flag::Flagged].into_iter().collect();
        store.set_flags("foo", "INBOX", 3, StoreMode::Add, &flagged).unwrap();
        let mut selection = inbox_selection(&store, false);

        let output = run_move("A1", "2:3", "Archive", false, &mut selection, &store).await;

        assert_eq!(output, "* 3 EXPUNGE\r\n* 2 EXPUNGE\r\nA1 OK MOVE completed\r\n");
        assert_eq!(uids(&store, "INBOX"), vec![1]);
        assert_eq!(uids(&store, "Archive"), vec![1, 2]);
        assert!(store.list_messages("foo", "Archive").unwrap()[1].has_flag(&Flag::Flagged));
        assert_eq!(selection.known_uids, vec![1]);
    }

    #[tokio::test]
    async fn uid_move_skips_missing_uids() {
        let store = store_with(&[RAW, RAW]);
        store.create_mailbox("foo", "Archive").unwrap();
        let mut selection = inbox_selection(&store, false);

        let output = run_move("A1", "2,9", "Archive", true, &mut selection, &store).await;

        assert_eq!(output, "* 2 EXPUNGE\r\nA1 OK UID MOVE completed\r\n");
        assert_eq!(uids(&store, "INBOX"), vec![1]);
    }

    #[tokio::test]
    async fn missing_destination_asks_to_create() {
        let store = store_with(&[RAW]);
        let mut selection = inbox_selection(&store, false);

        let output = run_move("A1", "1", "Nowhere", false, &mut selection, &store).await;

        assert!(output.starts_with("A1 NO [TRYCREATE]"));
        assert_eq!(uids(&store, "INBOX"), vec![1]);
    }

    #[tokio::test]
    async fn read_only_selection_is_no() {
        let store = store_with(&[RAW]);
        store.create_mailbox("foo", "Archive").unwrap();
        let mut selection = inbox_selection(&store, true);

        let output = run_move("A1", "1", "Archive", false, &mut selection, &store).await;

        assert!(output.starts_with("A1 NO"));
        assert_eq!(uids(&store, "INBOX"), vec![1]);
    }
}
