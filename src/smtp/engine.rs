//! SMTP transaction state machine.
//!
//! The engine is pure: it turns command lines into replies and tracks
//! the envelope, but performs no I/O and never touches the store. The
//! session loop feeds it lines, reads the DATA body when told to, and
//! hands the finished envelope to the store.
//!
//! ```text
//!   Connected --HELO/EHLO--> Greeted --MAIL--> MailFrom --RCPT--> RcptTo
//!                               ^                                  |  ^
//!                               |                                  |  | RCPT
//!                               +------ end of DATA body <--DATA---+--+
//! ```
//!
//! HELO/EHLO and RSET are accepted in every state and discard any open
//! envelope. Commands issued out of order are answered with `503` and
//! leave the state untouched.

use super::command::SmtpCommand;
use super::reply::{Reply, ReplyCode};
use crate::error::Error;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Where the session is in the MAIL/RCPT/DATA sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connected,
    Greeted,
    MailFrom,
    RcptTo,
    Data,
}

/// Sender and recipients of the transaction in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Reverse path; empty for the null sender.
    pub from: String,
    pub recipients: Vec<String>,
}

/// What the session loop must do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send the reply and read the next command.
    Reply(Reply),
    /// Send the reply, then read the message body.
    ReadData(Reply),
    /// Send the reply and close the connection.
    Close(Reply),
}

/// One line of a DATA body after transparency decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLine<'a> {
    Content(&'a [u8]),
    End,
}

/// Classify a raw body line (terminator included). A lone `.` ends the
/// body; otherwise one leading dot is removed.
#[must_use]
pub fn data_line(line: &[u8]) -> DataLine<'_> {
    match line {
        b".\r\n" | b".\n" => DataLine::End,
        [b'.', rest @ ..] => DataLine::Content(rest),
        _ => DataLine::Content(line),
    }
}

#[derive(Debug, Clone)]
pub struct SmtpEngine {
    hostname: String,
    max_message_size: usize,
    phase: Phase,
    client_name: Option<String>,
    envelope: Envelope,
}

impl SmtpEngine {
    #[must_use]
    pub fn new(hostname: impl Into<String>, max_message_size: usize) -> Self {
        Self {
            hostname: hostname.into(),
            max_message_size,
            phase: Phase::Connected,
            client_name: None,
            envelope: Envelope::default(),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    #[must_use]
    pub fn greeting(&self) -> Reply {
        Reply::new(
            ReplyCode::SERVICE_READY,
            format!("{} ESMTP mailsink ready", self.hostname),
        )
    }

    /// Parse and apply one command line.
    pub fn handle_line(&mut self, line: &str) -> Action {
        match SmtpCommand::parse(line) {
            Ok(command) => self.handle(command),
            Err(e) => Action::Reply(error_reply(&e)),
        }
    }

    pub fn handle(&mut self, command: SmtpCommand) -> Action {
        debug!(?command, phase = ?self.phase, "SMTP command");
        match command {
            SmtpCommand::Helo(name) => {
                self.greet(name);
                Action::Reply(Reply::new(ReplyCode::OK, self.hostname.clone()))
            }
            SmtpCommand::Ehlo(name) => {
                self.greet(name);
                Action::Reply(Reply::multiline(
                    ReplyCode::OK,
                    vec![
                        self.hostname.clone(),
                        "8BITMIME".to_string(),
                        format!("SIZE {}", self.max_message_size),
                    ],
                ))
            }
            SmtpCommand::MailFrom(from) => self.mail_from(from),
            SmtpCommand::RcptTo(to) => self.rcpt_to(to),
            SmtpCommand::Data => self.data(),
            SmtpCommand::Rset => {
                self.reset_transaction();
                Action::Reply(Reply::ok())
            }
            SmtpCommand::Noop => Action::Reply(Reply::new(ReplyCode::OK, "OK")),
            SmtpCommand::Vrfy(_) => Action::Reply(Reply::new(
                ReplyCode::CANNOT_VERIFY,
                "Cannot VRFY user, but will accept message and attempt delivery",
            )),
            SmtpCommand::Quit => Action::Close(Reply::new(
                ReplyCode::CLOSING,
                format!("{} Service closing transmission channel", self.hostname),
            )),
        }
    }

    fn greet(&mut self, name: String) {
        self.client_name = Some(name);
        self.envelope = Envelope::default();
        self.phase = Phase::Greeted;
    }

    fn mail_from(&mut self, from: String) -> Action {
        match self.phase {
            Phase::Connected => bad_sequence("Send HELO/EHLO first"),
            Phase::MailFrom | Phase::RcptTo | Phase::Data => bad_sequence("Nested MAIL command"),
            Phase::Greeted => {
                self.envelope = Envelope {
                    from,
                    recipients: Vec::new(),
                };
                self.phase = Phase::MailFrom;
                Action::Reply(Reply::ok())
            }
        }
    }

    fn rcpt_to(&mut self, to: String) -> Action {
        match self.phase {
            Phase::MailFrom | Phase::RcptTo => {
                self.envelope.recipients.push(to);
                self.phase = Phase::RcptTo;
                Action::Reply(Reply::ok())
            }
            _ => bad_sequence("Need MAIL before RCPT"),
        }
    }

    fn data(&mut self) -> Action {
        match self.phase {
            Phase::RcptTo => {
                self.phase = Phase::Data;
                Action::ReadData(Reply::new(
                    ReplyCode::START_DATA,
                    "Start mail input; end with <CRLF>.<CRLF>",
                ))
            }
            Phase::MailFrom => bad_sequence("Need RCPT before DATA"),
            _ => bad_sequence("Need MAIL before DATA"),
        }
    }

    /// Close the DATA phase and hand out the envelope. The session is
    /// ready for the next MAIL afterwards, whatever the delivery outcome.
    pub fn finish_data(&mut self) -> Envelope {
        self.phase = Phase::Greeted;
        std::mem::take(&mut self.envelope)
    }

    /// Drop the envelope and return to the post-greeting state.
    pub fn reset_transaction(&mut self) {
        self.envelope = Envelope::default();
        if self.phase != Phase::Connected {
            self.phase = Phase::Greeted;
        }
    }

    /// Trace headers prepended to every delivered message.
    #[must_use]
    pub fn trace_headers(&self, from: &str, client: &str, at: DateTime<Utc>) -> String {
        let helo = self.client_name.as_deref().unwrap_or("unknown");
        format!(
            "Return-Path: <{from}>\r\n\
             Received: from {client} (HELO {helo}) by {host} with SMTP; {date}\r\n",
            host = self.hostname,
            date = at.to_rfc2822(),
        )
    }

    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

fn bad_sequence(text: &str) -> Action {
    Action::Reply(error_reply(&Error::BadSequence(text.to_string())))
}

/// Map a recoverable error to its SMTP reply.
#[must_use]
pub fn error_reply(error: &Error) -> Reply {
    let (code, text) = match error {
        Error::UnknownCommand(_) => (ReplyCode::SYNTAX_ERROR, "Command unrecognized"),
        Error::Syntax(msg) => (ReplyCode::PARAMETER_ERROR, msg.as_str()),
        Error::BadSequence(msg) => (ReplyCode::BAD_SEQUENCE, msg.as_str()),
        Error::NotFound(msg) => (ReplyCode::MAILBOX_UNAVAILABLE, msg.as_str()),
        _ => (ReplyCode::LOCAL_ERROR, "Local error in processing"),
    };
    Reply::new(code, text)
}
