//! Per-connection SMTP loop.

use super::engine::{Action, DataLine, SmtpEngine, data_line};
use super::reply::{Reply, ReplyCode};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::io::{Interrupt, Line, guarded, read_line, write_line};
use crate::store::{MessageStore, principal_of};
use chrono::Utc;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// RFC 5321 limit for a command line, CRLF included.
const MAX_COMMAND_LINE: usize = 1000;

/// Outcome of reading a DATA body.
enum Body {
    Complete(Vec<u8>),
    TooLarge,
}

/// Serve one SMTP connection until QUIT, disconnect, idle timeout or
/// shutdown.
///
/// `client` names the peer in the `Received` trace header. Transport
/// errors end the session and discard any partial envelope.
pub async fn run_session<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    client: &str,
    store: &MessageStore,
    config: &ServerConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut stream = BufReader::new(stream);
    let mut engine = SmtpEngine::new(config.hostname.clone(), config.max_message_size);

    send(&mut stream, &engine.greeting()).await?;

    loop {
        let mut buf = Vec::new();
        let line = match guarded(
            read_line(&mut stream, &mut buf, MAX_COMMAND_LINE),
            config.idle_timeout,
            cancel,
        )
        .await
        {
            Ok(line) => line?,
            Err(interrupt) => {
                let text = match interrupt {
                    Interrupt::Idle => "closing transmission channel (idle timeout)",
                    Interrupt::Shutdown => "Service shutting down",
                };
                let reply = Reply::new(
                    ReplyCode::SERVICE_UNAVAILABLE,
                    format!("{} {text}", config.hostname),
                );
                send(&mut stream, &reply).await?;
                debug!(client, ?interrupt, "SMTP session interrupted");
                return Ok(());
            }
        };

        match line {
            Line::Eof => {
                debug!(client, "SMTP client disconnected");
                return Ok(());
            }
            Line::TooLong => {
                send(
                    &mut stream,
                    &Reply::new(ReplyCode::SYNTAX_ERROR, "Line too long"),
                )
                .await?;
                continue;
            }
            Line::Complete => {}
        }

        let text = String::from_utf8_lossy(&buf);
        trace!(client, line = %text.trim_end(), "SMTP <");

        match engine.handle_line(&text) {
            Action::Reply(reply) => send(&mut stream, &reply).await?,
            Action::Close(reply) => {
                send(&mut stream, &reply).await?;
                return Ok(());
            }
            Action::ReadData(reply) => {
                send(&mut stream, &reply).await?;
                let body = read_body(&mut stream, engine.max_message_size(), config, cancel).await;
                let envelope = engine.finish_data();
                let reply = match body? {
                    Body::TooLarge => {
                        warn!(client, from = %envelope.from, "Rejected oversized message");
                        Reply::new(
                            ReplyCode::EXCEEDED_STORAGE,
                            "Message exceeds fixed maximum message size",
                        )
                    }
                    Body::Complete(body) => {
                        let mut raw = engine
                            .trace_headers(&envelope.from, client, Utc::now())
                            .into_bytes();
                        raw.extend_from_slice(&body);
                        deliver(store, &envelope.recipients, raw)
                    }
                };
                send(&mut stream, &reply).await?;
            }
        }
    }
}

/// Read body lines up to the terminating dot.
///
/// An oversized body is still consumed to its end so the session stays
/// in sync with the client.
async fn read_body<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    max_size: usize,
    config: &ServerConfig,
    cancel: &CancellationToken,
) -> Result<Body> {
    let mut body = Vec::new();
    let mut too_large = false;
    let line_limit = max_size.max(MAX_COMMAND_LINE) + 2;

    loop {
        let mut buf = Vec::new();
        let line = guarded(read_line(stream, &mut buf, line_limit), config.idle_timeout, cancel)
            .await
            .map_err(|interrupt| {
                Error::Transport(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("DATA interrupted: {interrupt:?}"),
                ))
            })??;

        match line {
            Line::Eof => {
                return Err(Error::Transport(std::io::ErrorKind::UnexpectedEof.into()));
            }
            Line::TooLong => too_large = true,
            Line::Complete => match data_line(&buf) {
                DataLine::End => break,
                DataLine::Content(content) => {
                    if body.len() + content.len() > max_size {
                        too_large = true;
                    }
                    if !too_large {
                        body.extend_from_slice(content);
                    }
                }
            },
        }
    }

    Ok(if too_large {
        Body::TooLarge
    } else {
        Body::Complete(body)
    })
}

/// Append one copy of `raw` to each recipient's INBOX.
fn deliver(store: &MessageStore, recipients: &[String], raw: Vec<u8>) -> Reply {
    let raw: Arc<[u8]> = raw.into();
    for recipient in recipients {
        let principal = principal_of(recipient);
        if let Err(e) = store.deliver(&principal, raw.clone()) {
            warn!(%recipient, "Delivery failed: {e}");
            return Reply::new(
                ReplyCode::LOCAL_ERROR,
                "Requested action aborted: local error in processing",
            );
        }
    }

    let id = store.next_delivery_id();
    info!(%id, recipients = recipients.len(), size = raw.len(), "Accepted message");
    Reply::new(ReplyCode::OK, format!("OK: queued as {id}"))
}

async fn send<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    reply: &Reply,
) -> Result<()> {
    trace!(reply = %reply, "SMTP >");
    write_line(stream, &reply.to_wire()).await?;
    Ok(())
}
