//! Per-connection IMAP loop.
//!
//! ## Command format
//!
//! Every client command starts with a **tag**, an arbitrary string the
//! client chooses (async-imap uses `A0001`, `A0002`, etc.). The server
//! echoes this tag in its completion response so the client can match
//! responses to commands:
//!
//! ```text
//!   Client:  A0001 LOGIN user pass
//!   Server:  A0001 OK LOGIN completed
//! ```
//!
//! Lines prefixed with `*` are **untagged** responses: data the server
//! sends before the final tagged OK/NO/BAD.
//!
//! ## Literals
//!
//! A client may announce raw data inside a command with `{n}\r\n`. The
//! server answers with a `+` continuation, reads exactly `n` octets and
//! goes on decoding the rest of the command.

use super::handlers::{
    AppendArgs, CAPABILITIES, StoreArgs, handle_append, handle_authenticate, handle_capability,
    handle_close, handle_copy, handle_create, handle_delete, handle_expunge, handle_fetch,
    handle_list, handle_login, handle_logout, handle_move, handle_noop, handle_search,
    handle_select, handle_status, handle_store, handle_subscribe, handle_unsubscribe,
    report_changes,
};
use super::state::SessionState;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::io::{Interrupt, Line, guarded, read_line, write_line};
use crate::store::MessageStore;
use imap_codec::CommandCodec;
use imap_codec::decode::{CommandDecodeError, Decoder};
use imap_codec::imap_types::command::{Command, CommandBody};
use imap_codec::imap_types::extensions::binary::LiteralOrLiteral8;
use imap_codec::imap_types::mailbox::{ListMailbox, Mailbox as ImapMailbox};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Longest command line accepted between literals, CRLF included.
const MAX_COMMAND_LINE: usize = 64 * 1024;

/// Whether the session goes on after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// What the decoder made of the bytes collected so far.
enum Step {
    Done(Flow),
    Incomplete,
    Literal(usize),
    Failed,
}

/// Serve one IMAP connection until LOGOUT, disconnect, idle timeout or
/// shutdown.
pub async fn run_session<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    store: &MessageStore,
    config: &ServerConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut stream = BufReader::new(stream);
    let mut state = SessionState::NotAuthenticated;
    let codec = CommandCodec::default();

    // RFC 3501 Section 7.1.1: Server greeting
    let greeting = format!("* OK [CAPABILITY {CAPABILITIES}] mailsink ready\r\n");
    write_line(&mut stream, &greeting).await?;

    // Bytes of the command being assembled: lines plus literal data.
    let mut buf: Vec<u8> = Vec::new();
    // Literal octets accepted for the command in `buf`.
    let mut literal_bytes = 0usize;
    let command_limit = config.max_message_size.saturating_add(MAX_COMMAND_LINE);

    loop {
        if buf.is_empty() {
            literal_bytes = 0;
        }
        let line = match guarded(
            read_line(&mut stream, &mut buf, MAX_COMMAND_LINE),
            config.idle_timeout,
            cancel,
        )
        .await
        {
            Ok(line) => line?,
            Err(interrupt) => return bye(&mut stream, interrupt).await,
        };

        match line {
            Line::Eof => {
                debug!("IMAP client disconnected");
                return Ok(());
            }
            Line::TooLong => {
                buf.clear();
                write_line(&mut stream, "* BAD Command line too long\r\n").await?;
                continue;
            }
            Line::Complete => {}
        }

        if buf.trim_ascii().is_empty() {
            buf.clear();
            continue;
        }

        let step = match codec.decode(&buf) {
            Ok((_, command)) => {
                trace!(tag = command.tag.inner(), command = command.name(), "IMAP <");
                Step::Done(dispatch(&command, &mut state, store, &mut stream).await?)
            }
            Err(CommandDecodeError::Incomplete) => Step::Incomplete,
            Err(CommandDecodeError::LiteralFound { length, .. }) => Step::Literal(length as usize),
            Err(_) => Step::Failed,
        };

        match step {
            Step::Done(Flow::Close) => return Ok(()),
            Step::Done(Flow::Continue) => buf.clear(),
            Step::Incomplete => {}
            Step::Failed => {
                let resp = format!("{} BAD Parse error\r\n", guess_tag(&buf));
                buf.clear();
                write_line(&mut stream, &resp).await?;
            }
            Step::Literal(length)
                if literal_bytes.saturating_add(length) > config.max_message_size
                    || buf.len().saturating_add(length) > command_limit =>
            {
                // No continuation was sent, so the client will not
                // send the literal.
                let resp = format!("{} BAD Command exceeds maximum size\r\n", guess_tag(&buf));
                buf.clear();
                write_line(&mut stream, &resp).await?;
            }
            Step::Literal(length) => {
                write_line(&mut stream, "+ Ready for literal data\r\n").await?;
                literal_bytes += length;
                let start = buf.len();
                buf.resize(start + length, 0);
                let literal = stream.read_exact(&mut buf[start..]);
                let read = guarded(literal, config.idle_timeout, cancel).await;
                match read {
                    Ok(read) => {
                        read?;
                    }
                    Err(interrupt) => return bye(&mut stream, interrupt).await,
                }
            }
        }
    }
}

async fn bye<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    interrupt: Interrupt,
) -> Result<()> {
    let line = match interrupt {
        Interrupt::Idle => "* BYE Autologout; idle for too long\r\n",
        Interrupt::Shutdown => "* BYE Server shutting down\r\n",
    };
    debug!(?interrupt, "IMAP session interrupted");
    write_line(stream, line).await.map_err(Error::from)
}

/// The first word of an unparseable command, or `*`.
fn guess_tag(buf: &[u8]) -> String {
    let text = String::from_utf8_lossy(buf);
    text.split_whitespace()
        .next()
        .filter(|t| t.bytes().all(|b| b.is_ascii_graphic() && b != b'+' && b != b'{'))
        .unwrap_or("*")
        .to_string()
}

/// Extract the mailbox name from a parsed `imap_types::Mailbox`.
fn mailbox_name(mb: &ImapMailbox<'_>) -> String {
    match mb {
        ImapMailbox::Inbox => "INBOX".to_string(),
        ImapMailbox::Other(other) => {
            let bytes: &[u8] = other.as_ref();
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

fn list_pattern(pattern: &ListMailbox<'_>) -> String {
    let bytes: &[u8] = match pattern {
        ListMailbox::Token(token) => token.as_ref(),
        ListMailbox::String(string) => string.as_ref(),
    };
    String::from_utf8_lossy(bytes).into_owned()
}

/// Route one command to its handler, enforcing the state each command
/// is valid in.
#[allow(clippy::too_many_lines)]
async fn dispatch<S: AsyncRead + AsyncWrite + Unpin>(
    command: &Command<'_>,
    state: &mut SessionState,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<Flow> {
    let tag = command.tag.inner();
    let principal = state.principal().map(str::to_owned);

    match (&command.body, principal) {
        // Any state
        (CommandBody::Capability, _) => handle_capability(tag, stream).await?,
        (CommandBody::Noop, _) => handle_noop(tag, "NOOP", state, store, stream).await?,
        (CommandBody::Logout, _) => {
            handle_logout(tag, stream).await?;
            return Ok(Flow::Close);
        }

        // Not authenticated
        (CommandBody::Login { username, .. }, None) => {
            if let Some(principal) = handle_login(tag, username.as_ref(), store, stream).await? {
                *state = SessionState::Authenticated { principal };
            }
        }
        (CommandBody::Authenticate { .. }, None) => handle_authenticate(tag, stream).await?,
        (CommandBody::Login { .. } | CommandBody::Authenticate { .. }, Some(_)) => {
            let resp = format!("{tag} BAD Already authenticated\r\n");
            write_line(stream, &resp).await?;
        }

        // Authenticated
        (CommandBody::Select { mailbox }, Some(principal)) => {
            let name = mailbox_name(mailbox);
            let selected = handle_select(tag, &principal, &name, false, store, stream).await?;
            *state = selected
                .map_or(SessionState::Authenticated { principal }, SessionState::Selected);
        }
        (CommandBody::Examine { mailbox }, Some(principal)) => {
            let name = mailbox_name(mailbox);
            let selected = handle_select(tag, &principal, &name, true, store, stream).await?;
            *state = selected
                .map_or(SessionState::Authenticated { principal }, SessionState::Selected);
        }
        (CommandBody::Create { mailbox }, Some(principal)) => {
            handle_create(tag, &principal, &mailbox_name(mailbox), store, stream).await?;
        }
        (CommandBody::Delete { mailbox }, Some(principal)) => {
            handle_delete(tag, &principal, &mailbox_name(mailbox), store, stream).await?;
        }
        (
            CommandBody::List {
                reference,
                mailbox_wildcard,
            },
            Some(principal),
        ) => {
            let reference = mailbox_name(reference);
            let pattern = list_pattern(mailbox_wildcard);
            handle_list(tag, "LIST", &principal, &reference, &pattern, store, stream).await?;
        }
        (
            CommandBody::Lsub {
                reference,
                mailbox_wildcard,
            },
            Some(principal),
        ) => {
            let reference = mailbox_name(reference);
            let pattern = list_pattern(mailbox_wildcard);
            handle_list(tag, "LSUB", &principal, &reference, &pattern, store, stream).await?;
        }
        (
            CommandBody::Status {
                mailbox,
                item_names,
            },
            Some(principal),
        ) => {
            let name = mailbox_name(mailbox);
            handle_status(tag, &principal, &name, item_names, store, stream).await?;
        }
        (CommandBody::Subscribe { mailbox }, Some(principal)) => {
            handle_subscribe(tag, &principal, &mailbox_name(mailbox), store, stream).await?;
        }
        (CommandBody::Unsubscribe { mailbox }, Some(principal)) => {
            handle_unsubscribe(tag, &principal, &mailbox_name(mailbox), store, stream).await?;
        }
        (
            CommandBody::Append {
                mailbox,
                flags,
                date,
                message,
            },
            Some(principal),
        ) => {
            let name = mailbox_name(mailbox);
            let args = AppendArgs {
                mailbox: &name,
                flags,
                date: date.as_ref(),
                message: match message {
                    LiteralOrLiteral8::Literal(literal) => literal.data(),
                    LiteralOrLiteral8::Literal8(literal) => &*literal.data,
                },
            };
            let selection = match state {
                SessionState::Selected(selection) => Some(selection),
                _ => None,
            };
            handle_append(tag, &principal, &args, selection, store, stream).await?;
        }

        // Selected
        (body, Some(_)) if matches!(state, SessionState::Selected(_)) => {
            return dispatch_selected(tag, body, state, store, stream).await;
        }

        (body, _) if is_known(body) => {
            let resp = format!("{tag} BAD {} not allowed in this state\r\n", body.name());
            write_line(stream, &resp).await?;
        }
        (body, _) => {
            let resp = format!("{tag} BAD {} not supported\r\n", body.name());
            write_line(stream, &resp).await?;
        }
    }

    Ok(Flow::Continue)
}

/// Commands this server implements in some state.
const fn is_known(body: &CommandBody<'_>) -> bool {
    matches!(
        body,
        CommandBody::Login { .. }
            | CommandBody::Select { .. }
            | CommandBody::Examine { .. }
            | CommandBody::Create { .. }
            | CommandBody::Delete { .. }
            | CommandBody::List { .. }
            | CommandBody::Lsub { .. }
            | CommandBody::Status { .. }
            | CommandBody::Subscribe { .. }
            | CommandBody::Unsubscribe { .. }
            | CommandBody::Append { .. }
            | CommandBody::Check
            | CommandBody::Close
            | CommandBody::Expunge
            | CommandBody::Search { .. }
            | CommandBody::Fetch { .. }
            | CommandBody::Store { .. }
            | CommandBody::Copy { .. }
            | CommandBody::Move { .. }
    )
}

async fn dispatch_selected<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    body: &CommandBody<'_>,
    state: &mut SessionState,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<Flow> {
    if matches!(body, CommandBody::Check) {
        handle_noop(tag, "CHECK", state, store, stream).await?;
        return Ok(Flow::Continue);
    }
    if matches!(body, CommandBody::Close) {
        if let SessionState::Selected(selection) = &*state {
            handle_close(tag, selection, store, stream).await?;
        }
        let current = std::mem::replace(state, SessionState::NotAuthenticated);
        *state = current.deselect();
        return Ok(Flow::Continue);
    }

    let SessionState::Selected(selection) = state else {
        return Ok(Flow::Continue);
    };

    // RFC 3501 Section 7.4.1: no EXPUNGE while positions are in use, so
    // the plain forms only learn about new arrivals.
    if let CommandBody::Search { uid, .. }
    | CommandBody::Fetch { uid, .. }
    | CommandBody::Store { uid, .. }
    | CommandBody::Copy { uid, .. } = body
    {
        report_changes(selection, store, stream, *uid).await?;
    }

    match body {
        CommandBody::Expunge => handle_expunge(tag, selection, store, stream).await?,
        CommandBody::Search { criteria, uid, .. } => {
            handle_search(tag, criteria.as_ref(), *uid, selection, store, stream).await?;
        }
        CommandBody::Fetch {
            sequence_set,
            macro_or_item_names,
            uid,
        } => {
            handle_fetch(tag, sequence_set, macro_or_item_names, *uid, selection, store, stream)
                .await?;
        }
        CommandBody::Store {
            sequence_set,
            kind,
            response,
            flags,
            uid,
        } => {
            let args = StoreArgs {
                sequence_set,
                kind,
                response,
                flags,
            };
            handle_store(tag, &args, *uid, selection, store, stream).await?;
        }
        CommandBody::Copy {
            sequence_set,
            mailbox,
            uid,
        } => {
            let dest = mailbox_name(mailbox);
            handle_copy(tag, sequence_set, &dest, *uid, selection, store, stream).await?;
        }
        CommandBody::Move {
            sequence_set,
            mailbox,
            uid,
        } => {
            let dest = mailbox_name(mailbox);
            handle_move(tag, sequence_set, &dest, *uid, selection, store, stream).await?;
        }
        other => {
            let resp = format!("{tag} BAD {} not supported\r\n", other.name());
            write_line(stream, &resp).await?;
        }
    }

    Ok(Flow::Continue)
}
