//! CAPABILITY command handler.
//!
//! RFC 3501 Section 6.1.1 requires this command in every state.

use crate::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub const CAPABILITIES: &str = "IMAP4rev1 MOVE";

/// Handle the CAPABILITY command.
pub async fn handle_capability<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    write_line(stream, &format!("* CAPABILITY {CAPABILITIES}\r\n")).await?;
    let resp = format!("{tag} OK CAPABILITY completed\r\n");
    write_line(stream, &resp).await
}
