//! CREATE command handler.

use super::tagged_error;
use crate::io::write_line;
use crate::store::MessageStore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the CREATE command. A trailing hierarchy delimiter is
/// ignored.
pub async fn handle_create<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    principal: &str,
    mailbox_name: &str,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let name = mailbox_name.trim_end_matches('/');
    if name.is_empty() {
        let resp = format!("{tag} BAD Mailbox name required\r\n");
        return write_line(stream, &resp).await;
    }

    let resp = match store.create_mailbox(principal, name) {
        Ok(_) => format!("{tag} OK CREATE completed\r\n"),
        Err(e) => tagged_error(tag, &e),
    };
    write_line(stream, &resp).await
}
