//! The IMAP side as seen by a real client library.
//!
//! `async-imap` speaks the futures I/O traits, so the tokio stream is
//! wrapped with the `tokio-util` compat layer.

mod common;

use common::{make_raw_email, send_mail, start};
use futures::TryStreamExt;
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

type ImapSession = async_imap::Session<Compat<TcpStream>>;

async fn connect(handle: &mailsink::ServerHandle, user: &str) -> ImapSession {
    let tcp_stream = TcpStream::connect(handle.imap_addr()).await.unwrap();
    let client = async_imap::Client::new(tcp_stream.compat());
    client
        .login(user, "anything")
        .await
        .map_err(|(e, _)| e)
        .expect("login")
}

async fn deliver(handle: &mailsink::ServerHandle, to: &str, subject: &str, body: &str) -> String {
    let raw = make_raw_email("alice@example.com", to, subject, body);
    send_mail(handle.smtp_addr(), "alice@example.com", &[to], &raw).await;
    raw
}

#[tokio::test]
async fn test_select_and_fetch_body() {
    let handle = start().await;
    let raw = deliver(&handle, "bob@example.com", "Hello Bob", "This is a test email.").await;

    let mut session = connect(&handle, "bob").await;
    let mailbox = session.select("INBOX").await.unwrap();
    assert_eq!(mailbox.exists, 1);
    assert!(mailbox.uid_validity.is_some());

    let messages: Vec<_> = session
        .uid_fetch("1", "(BODY.PEEK[])")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].uid, Some(1));
    let body = messages[0].body().expect("body");
    assert!(body.ends_with(raw.as_bytes()));
    assert!(body.starts_with(b"Return-Path: <alice@example.com>\r\n"));

    session.logout().await.unwrap();
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_envelope_subject() {
    let handle = start().await;
    deliver(&handle, "bob@example.com", "Quarterly report", "Numbers.").await;

    let mut session = connect(&handle, "bob").await;
    session.select("INBOX").await.unwrap();

    let messages: Vec<_> = session
        .fetch("1", "(UID ENVELOPE)")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let envelope = messages[0].envelope().expect("envelope");
    assert_eq!(envelope.subject.as_deref(), Some(&b"Quarterly report"[..]));

    session.logout().await.unwrap();
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_search_store_expunge() {
    let handle = start().await;
    for subject in ["one", "two", "three"] {
        deliver(&handle, "bob@example.com", subject, "body").await;
    }

    let mut session = connect(&handle, "bob").await;
    session.select("INBOX").await.unwrap();

    let found = session.search("SUBJECT two").await.unwrap();
    assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![2]);

    let _: Vec<_> = session
        .store("1:2", "+FLAGS (\\Deleted)")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    let expunged: Vec<u32> = session.expunge().await.unwrap().try_collect().await.unwrap();
    assert_eq!(expunged, vec![2, 1]);

    let mut remaining: Vec<u32> = session.uid_search("ALL").await.unwrap().into_iter().collect();
    remaining.sort_unstable();
    assert_eq!(remaining, vec![3]);

    session.logout().await.unwrap();
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_list_created_folders() {
    let handle = start().await;
    let mut session = connect(&handle, "bob").await;

    session.create("Sent").await.unwrap();
    session.create("Trash").await.unwrap();

    let names: Vec<String> = session
        .list(Some(""), Some("*"))
        .await
        .unwrap()
        .map_ok(|name| name.name().to_string())
        .try_collect()
        .await
        .unwrap();
    assert!(names.contains(&"Sent".to_string()));
    assert!(names.contains(&"Trash".to_string()));

    session.logout().await.unwrap();
    handle.shutdown().await.unwrap();
}
