//! Fixtures shared by the handler tests.

use crate::imap::state::Selection;
use crate::store::{MailboxName, MessageStore};
use tokio::io::{BufReader, DuplexStream};

pub const RAW: &str = "From: a@b.com\r\nSubject: Test\r\n\r\nBody";

/// Read everything the handler wrote once the server half is dropped.
pub async fn output(client: DuplexStream) -> String {
    let mut buf = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
        .await
        .unwrap();
    String::from_utf8(buf).unwrap()
}

/// A store where `foo` owns an INBOX holding `bodies` in order.
pub fn store_with(bodies: &[&str]) -> MessageStore {
    let store = MessageStore::new();
    store.create_mailbox_if_absent("foo", MailboxName::INBOX);
    for body in bodies {
        store.deliver("foo", body.as_bytes().to_vec()).unwrap();
    }
    store
}

/// `foo`'s INBOX selected with every current message known.
pub fn inbox_selection(store: &MessageStore, read_only: bool) -> Selection {
    let live = store.list_messages("foo", MailboxName::INBOX).unwrap();
    Selection::new("foo", MailboxName::inbox(), read_only, &live)
}
