//! Many clients delivering into the same mailbox at once.

mod common;

use common::{LineClient, send_mail, start};
use futures::future::join_all;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_parallel_deliveries() {
    let handle = start().await;
    let addr = handle.smtp_addr();

    let sends = (0..50).map(|n| {
        tokio::spawn(async move {
            let body = format!("Subject: parallel {n}\r\n\r\nmessage {n}\r\n");
            send_mail(addr, "load@bar.com", &["sink@bar.com"], &body).await
        })
    });
    for reply in join_all(sends).await {
        assert!(reply.unwrap().starts_with("250 "));
    }

    let messages = handle.store().list_messages("sink", "INBOX").unwrap();
    assert_eq!(messages.len(), 50);
    let uids: Vec<u32> = messages.iter().map(|m| m.uid).collect();
    assert!(uids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(uids, (1..=50).collect::<Vec<_>>());

    for n in 0..50 {
        let needle = format!("message {n}\r\n");
        let count = messages
            .iter()
            .filter(|m| String::from_utf8_lossy(&m.raw).contains(&needle))
            .count();
        assert_eq!(count, 1, "message {n} stored {count} times");
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_see_concurrent_deliveries() {
    let handle = start().await;
    send_mail(handle.smtp_addr(), "a@bar.com", &["sink@bar.com"], "first\r\n").await;

    let mut reader = LineClient::connect(handle.imap_addr()).await;
    reader.line().await;
    reader.send("a1 LOGIN sink x").await;
    reader.until_tagged("a1").await;
    reader.send("a2 SELECT INBOX").await;
    assert!(reader.until_tagged("a2").await.contains("* 1 EXISTS"));

    let addr = handle.smtp_addr();
    let sends = (0..10).map(|_| {
        tokio::spawn(send_mail(addr, "a@bar.com", &["sink@bar.com"], "more\r\n"))
    });
    join_all(sends).await;

    reader.send("a3 NOOP").await;
    assert_eq!(reader.until_tagged("a3").await, "* 11 EXISTS\r\na3 OK NOOP completed\r\n");

    handle.shutdown().await.unwrap();
}
