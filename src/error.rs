//! Error types for mailsink

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed command line.
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Command verb the server does not implement.
    #[error("Unrecognized command: {0}")]
    UnknownCommand(String),

    /// Command is well-formed but not allowed in the current state.
    #[error("Bad sequence of commands: {0}")]
    BadSequence(String),

    /// Referenced mailbox or message does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Session or size limits reached.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl Error {
    /// Whether this error ends the session that produced it.
    ///
    /// Protocol-level errors are reported to the client and the
    /// session continues; transport failures and exhausted limits
    /// close the connection.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ResourceExhausted(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_are_recoverable() {
        assert!(!Error::Syntax("x".into()).is_fatal());
        assert!(!Error::UnknownCommand("TURN".into()).is_fatal());
        assert!(!Error::BadSequence("x".into()).is_fatal());
        assert!(!Error::NotFound("x".into()).is_fatal());
    }

    #[test]
    fn transport_and_exhaustion_are_fatal() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(Error::from(io).is_fatal());
        assert!(Error::ResourceExhausted("busy".into()).is_fatal());
    }
}
