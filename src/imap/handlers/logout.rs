//! LOGOUT command handler.
//!
//! The server sends an untagged BYE before the tagged OK, then the
//! session closes the connection.

use crate::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the LOGOUT command.
pub async fn handle_logout<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    write_line(stream, "* BYE IMAP4rev1 Server logging out\r\n").await?;
    let resp = format!("{tag} OK LOGOUT completed\r\n");
    write_line(stream, &resp).await
}
