//! IMAP command handlers.
//!
//! Each handler lives in its own module and processes a single IMAP
//! command. Handlers write their untagged data and the tagged
//! completion to the stream; only write failures are returned, and
//! those end the session.

mod append;
mod capability;
mod close;
mod copy;
mod create;
mod delete;
mod expunge;
mod fetch;
mod list;
mod login;
mod logout;
mod move_to;
mod noop;
mod search;
mod select;
mod status;
mod store;
mod subscribe;

#[cfg(test)]
pub(crate) mod testing;

pub use append::{AppendArgs, handle_append};
pub use capability::{CAPABILITIES, handle_capability};
pub use close::handle_close;
pub use copy::handle_copy;
pub use create::handle_create;
pub use delete::handle_delete;
pub use expunge::handle_expunge;
pub use fetch::handle_fetch;
pub use list::handle_list;
pub use login::{handle_authenticate, handle_login};
pub use logout::handle_logout;
pub use move_to::handle_move;
pub use noop::handle_noop;
pub use search::handle_search;
pub use select::handle_select;
pub use status::handle_status;
pub use store::{StoreArgs, handle_store};
pub use subscribe::{handle_subscribe, handle_unsubscribe};

use crate::error::Error;
use crate::imap::state::Selection;
use crate::io::write_line;
use crate::store::MessageStore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Tagged completion for a failed command: `BAD` for syntax errors,
/// `NO` for everything else.
#[must_use]
pub fn tagged_error(tag: &str, error: &Error) -> String {
    match error {
        Error::Syntax(msg) => format!("{tag} BAD {msg}\r\n"),
        Error::BadSequence(msg) | Error::ResourceExhausted(msg) => format!("{tag} NO {msg}\r\n"),
        Error::NotFound(what) => format!("{tag} NO No such {what}\r\n"),
        other => format!("{tag} NO {other}\r\n"),
    }
}

/// Tell the client what changed in the selected mailbox since its
/// last command: `* n EXPUNGE` for vanished messages (only when
/// `report_expunges`), then `* n EXISTS` if messages arrived.
///
/// A mailbox that can no longer be read is left for the command itself
/// to report.
pub async fn report_changes<S: AsyncRead + AsyncWrite + Unpin>(
    selection: &mut Selection,
    store: &MessageStore,
    stream: &mut BufReader<S>,
    report_expunges: bool,
) -> std::io::Result<()> {
    let Ok(live) = store.list_messages(&selection.principal, selection.mailbox.as_str()) else {
        return Ok(());
    };
    let changes = selection.refresh(&live, report_expunges);

    for position in changes.expunged {
        write_line(stream, &format!("* {position} EXPUNGE\r\n")).await?;
    }
    if let Some(exists) = changes.exists {
        write_line(stream, &format!("* {exists} EXISTS\r\n")).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_is_bad_and_missing_is_no() {
        assert_eq!(
            tagged_error("A1", &Error::Syntax("Parse error".into())),
            "A1 BAD Parse error\r\n"
        );
        assert_eq!(
            tagged_error("A2", &Error::NotFound("mailbox Work".into())),
            "A2 NO No such mailbox Work\r\n"
        );
        assert!(tagged_error("A3", &Error::BadSequence("x".into())).starts_with("A3 NO "));
    }
}
