//! CLOSE command handler.
//!
//! Like EXPUNGE without the untagged responses, then the session drops
//! back to the authenticated state. A mailbox opened with EXAMINE is
//! closed without removing anything.

use crate::imap::state::Selection;
use crate::io::write_line;
use crate::store::MessageStore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::warn;

pub async fn handle_close<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    selection: &Selection,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    if !selection.read_only
        && let Err(e) = store.expunge(&selection.principal, selection.mailbox.as_str())
    {
        // The mailbox is gone; closing it still succeeds.
        warn!(mailbox = %selection.mailbox, "CLOSE could not expunge: {e}");
    }

    let resp = format!("{tag} OK CLOSE completed\r\n");
    write_line(stream, &resp).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::{Flag, FlagSet, StoreMode};
    use crate::imap::handlers::testing::{RAW, inbox_selection, output, store_with};

    async fn run(selection: &Selection, store: &MessageStore) -> String {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);
        handle_close("A1", selection, store, &mut stream).await.unwrap();
        drop(stream);
        output(client).await
    }

    fn store_with_deleted() -> MessageStore {
        let store = store_with(&[RAW, RAW]);
        let flags: FlagSet = [Flag::Deleted].into_iter().collect();
        store.set_flags("foo", "INBOX", 2, StoreMode::Add, &flags).unwrap();
        store
    }

    #[tokio::test]
    async fn expunges_silently() {
        let store = store_with_deleted();
        let selection = inbox_selection(&store, false);

        assert_eq!(run(&selection, &store).await, "A1 OK CLOSE completed\r\n");
        assert_eq!(store.status("foo", "INBOX").unwrap().exists, 1);
    }

    #[tokio::test]
    async fn examine_keeps_deleted_messages() {
        let store = store_with_deleted();
        let selection = inbox_selection(&store, true);

        assert_eq!(run(&selection, &store).await, "A1 OK CLOSE completed\r\n");
        assert_eq!(store.status("foo", "INBOX").unwrap().exists, 2);
    }
}
