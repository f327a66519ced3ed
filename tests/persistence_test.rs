//! Snapshot written on shutdown and loaded on the next start.

mod common;

use common::{send_mail, start_with};
use mailsink::{MailServer, MessageStore, ServerConfig};
use std::sync::Arc;

#[tokio::test]
async fn test_store_survives_restart() {
    let path = std::env::temp_dir().join(format!("mailsink-snapshot-{}.json", std::process::id()));
    let config = ServerConfig {
        store_path: Some(path.clone()),
        ..ServerConfig::ephemeral()
    };

    let handle = start_with(config.clone()).await;
    send_mail(handle.smtp_addr(), "foo@bar.com", &["foo2@bar.com"], "kept\r\n").await;
    send_mail(handle.smtp_addr(), "foo@bar.com", &["foo2@bar.com"], "also kept\r\n").await;
    handle.shutdown().await.unwrap();

    let store = MessageStore::load(&path).unwrap();
    let before = store.status("foo2", "INBOX").unwrap();
    assert_eq!(before.exists, 2);

    let handle = MailServer::start(config, Arc::new(store)).await.unwrap();
    send_mail(handle.smtp_addr(), "foo@bar.com", &["foo2@bar.com"], "new\r\n").await;

    let messages = handle.store().list_messages("foo2", "INBOX").unwrap();
    let uids: Vec<u32> = messages.iter().map(|m| m.uid).collect();
    assert_eq!(uids, vec![1, 2, 3]);
    assert_eq!(
        handle.store().status("foo2", "INBOX").unwrap().uid_validity,
        before.uid_validity
    );

    handle.shutdown().await.unwrap();
    std::fs::remove_file(&path).unwrap();
}
