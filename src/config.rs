//! Server configuration

use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Listener and session settings shared by the SMTP and IMAP sides.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub smtp_port: u16,
    pub imap_port: u16,
    /// Name announced in greetings and trace headers.
    pub hostname: String,
    /// Upper bound on concurrently open sessions, per protocol.
    pub max_sessions: usize,
    pub idle_timeout: Duration,
    pub max_message_size: usize,
    /// JSON snapshot loaded at start and written on shutdown.
    pub store_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            smtp_port: 3025,
            imap_port: 3143,
            hostname: "localhost".to_string(),
            max_sessions: 64,
            idle_timeout: Duration::from_secs(300),
            max_message_size: 10 * 1024 * 1024,
            store_path: None,
        }
    }
}

impl ServerConfig {
    /// Defaults with both listeners on OS-assigned ports.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            smtp_port: 0,
            imap_port: 0,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    ///
    /// Reads from `.env` file if present. All variables are optional:
    /// - `MAILSINK_HOST` (default: `127.0.0.1`)
    /// - `MAILSINK_SMTP_PORT` (default: `3025`)
    /// - `MAILSINK_IMAP_PORT` (default: `3143`)
    /// - `MAILSINK_HOSTNAME` (default: `localhost`)
    /// - `MAILSINK_MAX_SESSIONS` (default: `64`)
    /// - `MAILSINK_IDLE_TIMEOUT_SECS` (default: `300`)
    /// - `MAILSINK_MAX_MESSAGE_SIZE` (default: `10485760`)
    /// - `MAILSINK_STORE_PATH` (default: unset, in-memory only)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            host: env::var("MAILSINK_HOST").unwrap_or(defaults.host),
            smtp_port: parse_var("MAILSINK_SMTP_PORT", defaults.smtp_port)?,
            imap_port: parse_var("MAILSINK_IMAP_PORT", defaults.imap_port)?,
            hostname: env::var("MAILSINK_HOSTNAME").unwrap_or(defaults.hostname),
            max_sessions: parse_var("MAILSINK_MAX_SESSIONS", defaults.max_sessions)?,
            idle_timeout: Duration::from_secs(parse_var(
                "MAILSINK_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )?),
            max_message_size: parse_var("MAILSINK_MAX_MESSAGE_SIZE", defaults.max_message_size)?,
            store_path: env::var("MAILSINK_STORE_PATH").ok().map(PathBuf::from),
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}
