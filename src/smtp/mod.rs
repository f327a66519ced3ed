//! SMTP receiving side
//!
//! Commands are parsed by [`SmtpCommand`], sequenced by the pure
//! [`SmtpEngine`], and [`run_session`] drives one connection: it reads
//! lines, undoes dot-stuffing in the DATA body and appends one copy of
//! each accepted message to every recipient's INBOX.

mod command;
mod engine;
mod reply;
mod session;

pub use command::{SmtpCommand, validate_address};
pub use engine::{Action, DataLine, Envelope, Phase, SmtpEngine, data_line, error_reply};
pub use reply::{Reply, ReplyCode};
pub use session::run_session;
