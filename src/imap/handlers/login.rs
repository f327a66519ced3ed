//! LOGIN and AUTHENTICATE command handlers.
//!
//! Any password is accepted: the user name alone picks the principal,
//! which is provisioned with an INBOX on first login.

use crate::io::write_line;
use crate::store::{MailboxName, MessageStore, principal_of};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::info;

/// Handle the LOGIN command. Returns the authenticated principal.
pub async fn handle_login<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    username: &[u8],
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<Option<String>> {
    let principal = principal_of(&String::from_utf8_lossy(username));
    if principal.is_empty() {
        let resp = format!("{tag} NO LOGIN failed: empty user name\r\n");
        write_line(stream, &resp).await?;
        return Ok(None);
    }

    store.create_mailbox_if_absent(&principal, MailboxName::INBOX);
    info!(principal, "IMAP login");

    let resp = format!("{tag} OK LOGIN completed\r\n");
    write_line(stream, &resp).await?;
    Ok(Some(principal))
}

/// SASL is not offered; clients must use LOGIN.
pub async fn handle_authenticate<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let resp = format!("{tag} NO AUTHENTICATE not supported, use LOGIN\r\n");
    write_line(stream, &resp).await
}
