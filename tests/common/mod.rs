//! Helpers shared by the integration tests
//!
//! [`start`] runs a real [`MailServer`] on OS-assigned ports.
//! [`LineClient`] speaks raw SMTP or IMAP over TCP, one line at a time,
//! so the tests can assert on the exact wire text.

#![allow(dead_code)]

use mailsink::{MailServer, MessageStore, ServerConfig, ServerHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Start a server with an empty store.
pub async fn start() -> ServerHandle {
    start_with(ServerConfig::ephemeral()).await
}

pub async fn start_with(config: ServerConfig) -> ServerHandle {
    MailServer::start(config, Arc::new(MessageStore::new()))
        .await
        .expect("start mail server")
}

/// Build a minimal valid RFC 5322 email.
pub fn make_raw_email(from: &str, to: &str, subject: &str, body: &str) -> String {
    format!(
        "From: {from}\r\n\
         To: {to}\r\n\
         Subject: {subject}\r\n\
         Date: Mon, 01 Jan 2024 12:00:00 +0000\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {body}\r\n"
    )
}

pub struct LineClient {
    reader: BufReader<TcpStream>,
}

impl LineClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self {
            reader: BufReader::new(stream),
        }
    }

    pub async fn send(&mut self, line: &str) {
        let stream = self.reader.get_mut();
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.write_all(b"\r\n").await.unwrap();
        stream.flush().await.unwrap();
    }

    /// Next line with its CRLF, or an empty string at EOF.
    pub async fn line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        line
    }

    /// Read a complete SMTP reply, continuation lines included.
    pub async fn reply(&mut self) -> String {
        let mut reply = String::new();
        loop {
            let line = self.line().await;
            let last = line.as_bytes().get(3) != Some(&b'-');
            reply.push_str(&line);
            if last || line.is_empty() {
                return reply;
            }
        }
    }

    /// Read IMAP responses up to and including the tagged line.
    pub async fn until_tagged(&mut self, tag: &str) -> String {
        let mut out = String::new();
        loop {
            let line = self.line().await;
            assert!(!line.is_empty(), "connection closed before {tag}: {out}");
            let done = line.starts_with(&format!("{tag} "));
            out.push_str(&line);
            if done {
                return out;
            }
        }
    }

    /// Everything the server sends until it closes the connection.
    pub async fn rest(&mut self) -> String {
        let mut out = String::new();
        self.reader.read_to_string(&mut out).await.unwrap();
        out
    }
}

/// Deliver one message over SMTP and return the final DATA reply.
pub async fn send_mail(addr: SocketAddr, from: &str, to: &[&str], raw: &str) -> String {
    let mut client = LineClient::connect(addr).await;
    assert!(client.reply().await.starts_with("220 "));

    client.send("HELO test").await;
    assert!(client.reply().await.starts_with("250 "));
    client.send(&format!("MAIL FROM:<{from}>")).await;
    assert!(client.reply().await.starts_with("250 "));
    for rcpt in to {
        client.send(&format!("RCPT TO:<{rcpt}>")).await;
        assert!(client.reply().await.starts_with("250 "));
    }
    client.send("DATA").await;
    assert!(client.reply().await.starts_with("354 "));

    let body = raw.strip_suffix("\r\n").unwrap_or(raw);
    client.send(body).await;
    client.send(".").await;
    let reply = client.reply().await;

    client.send("QUIT").await;
    assert!(client.reply().await.starts_with("221 "));
    reply
}
