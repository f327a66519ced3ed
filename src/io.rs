//! Shared I/O helpers for the protocol sessions.
//!
//! Writes flush eagerly so that every reply reaches the client before
//! the session waits for its next command. Reads are line-oriented and
//! bounded so a client cannot make a session buffer without limit.

use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Outcome of reading one protocol line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    /// A full line, terminator included, was appended to the buffer.
    Complete,
    /// The line exceeded the limit. It was consumed and discarded.
    TooLong,
    /// The peer closed the connection.
    Eof,
}

/// Why a guarded read gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Nothing arrived within the idle timeout.
    Idle,
    /// The server is shutting down.
    Shutdown,
}

/// Run a read under the session's idle timeout and the server's
/// shutdown token.
pub async fn guarded<F: Future>(
    read: F,
    idle: Duration,
    cancel: &CancellationToken,
) -> Result<F::Output, Interrupt> {
    tokio::select! {
        () = cancel.cancelled() => Err(Interrupt::Shutdown),
        res = tokio::time::timeout(idle, read) => res.map_err(|_| Interrupt::Idle),
    }
}

/// Write a string to the stream and flush.
pub async fn write_line<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    line: &str,
) -> std::io::Result<()> {
    write_bytes(stream, line.as_bytes()).await
}

/// Write raw bytes to the stream and flush.
pub async fn write_bytes<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    data: &[u8],
) -> std::io::Result<()> {
    stream.get_mut().write_all(data).await?;
    stream.get_mut().flush().await
}

/// Read one `\n`-terminated line of at most `limit` bytes into `buf`.
///
/// The terminator is kept. A final unterminated fragment before EOF is
/// reported as [`Line::Eof`].
pub async fn read_line<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    buf: &mut Vec<u8>,
    limit: usize,
) -> std::io::Result<Line> {
    let start = buf.len();
    let n = (&mut *stream)
        .take(limit as u64)
        .read_until(b'\n', buf)
        .await?;

    if buf.ends_with(b"\n") {
        return Ok(Line::Complete);
    }
    if n < limit {
        return Ok(Line::Eof);
    }

    // Over the limit: drop what was read and skip to the end of the line.
    buf.truncate(start);
    let mut discard = Vec::new();
    loop {
        discard.clear();
        let n = (&mut *stream).take(4096).read_until(b'\n', &mut discard).await?;
        if n == 0 {
            return Ok(Line::Eof);
        }
        if discard.ends_with(b"\n") {
            return Ok(Line::TooLong);
        }
    }
}
