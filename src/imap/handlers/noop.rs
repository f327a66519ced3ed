//! NOOP and CHECK command handlers.
//!
//! Both do nothing by themselves, but give the server a chance to
//! report what changed in the selected mailbox since the last command:
//! messages expunged by other sessions, then new arrivals.

use super::report_changes;
use crate::imap::state::SessionState;
use crate::io::write_line;
use crate::store::MessageStore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle NOOP (or CHECK, named by `command`).
pub async fn handle_noop<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    command: &str,
    state: &mut SessionState,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    if let SessionState::Selected(selection) = state {
        report_changes(selection, store, stream, true).await?;
    }

    let resp = format!("{tag} OK {command} completed\r\n");
    write_line(stream, &resp).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::{Flag, FlagSet, StoreMode};
    use crate::imap::handlers::testing::{RAW, inbox_selection, output, store_with};

    fn deleted() -> FlagSet {
        [Flag::Deleted].into_iter().collect()
    }

    async fn run(tag: &str, state: &mut SessionState, store: &MessageStore) -> String {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);

        handle_noop(tag, "NOOP", state, store, &mut stream).await.unwrap();
        drop(stream);
        output(client).await
    }

    #[tokio::test]
    async fn responds_with_ok() {
        let store = MessageStore::new();
        let mut state = SessionState::NotAuthenticated;
        assert_eq!(run("A1", &mut state, &store).await, "A1 OK NOOP completed\r\n");
    }

    #[tokio::test]
    async fn reports_new_messages() {
        let store = store_with(&[RAW]);
        let mut state = SessionState::Selected(inbox_selection(&store, false));
        store.deliver("foo", RAW.as_bytes().to_vec()).unwrap();

        let output = run("A2", &mut state, &store).await;
        assert_eq!(output, "* 2 EXISTS\r\nA2 OK NOOP completed\r\n");

        let SessionState::Selected(selection) = &state else {
            panic!("still selected");
        };
        assert_eq!(selection.exists(), 2);
        assert_eq!(run("A3", &mut state, &store).await, "A3 OK NOOP completed\r\n");
    }

    #[tokio::test]
    async fn reports_messages_expunged_elsewhere() {
        let store = store_with(&[RAW, RAW, RAW]);
        let mut state = SessionState::Selected(inbox_selection(&store, false));
        for uid in [1, 3] {
            store.set_flags("foo", "INBOX", uid, StoreMode::Add, &deleted()).unwrap();
        }
        store.expunge("foo", "INBOX").unwrap();
        store.deliver("foo", RAW.as_bytes().to_vec()).unwrap();

        let output = run("A1", &mut state, &store).await;
        assert_eq!(
            output,
            "* 3 EXPUNGE\r\n* 1 EXPUNGE\r\n* 2 EXISTS\r\nA1 OK NOOP completed\r\n"
        );
        let SessionState::Selected(selection) = &state else {
            panic!("still selected");
        };
        assert_eq!(selection.known_uids, vec![2, 4]);
    }
}
