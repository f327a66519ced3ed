//! LIST and LSUB command handler.
//!
//! Responds with one line per mailbox whose name matches the pattern,
//! followed by the tagged OK. The format follows RFC 3501 Section
//! 7.2.2:
//!
//! ```text
//! * LIST (\HasNoChildren) "/" "INBOX"
//! * LIST (\HasNoChildren) "/" "Sent"
//! A0002 OK LIST completed
//! ```
//!
//! `*` matches any run of characters, `%` the same without crossing the
//! `/` hierarchy delimiter. LSUB answers like LIST but only with the
//! mailboxes marked by SUBSCRIBE.

use crate::imap::view::quoted;
use crate::io::write_line;
use crate::store::MessageStore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

const DELIMITER: char = '/';

/// Handle LIST (or LSUB, named by `command`).
pub async fn handle_list<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    command: &str,
    principal: &str,
    reference: &str,
    pattern: &str,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    // RFC 3501 Section 6.3.8: an empty pattern asks for the delimiter
    if pattern.is_empty() {
        let line = format!("* {command} (\\Noselect) \"{DELIMITER}\" \"\"\r\n");
        write_line(stream, &line).await?;
    } else {
        let pattern: Vec<char> = format!("{reference}{pattern}").to_lowercase().chars().collect();
        let names = if command == "LSUB" {
            store.list_subscribed(principal)
        } else {
            store.list_mailboxes(principal)
        };
        for name in names {
            let candidate: Vec<char> = name.key().chars().collect();
            if !matches(&pattern, &candidate) {
                continue;
            }
            let line = format!(
                "* {command} (\\HasNoChildren) \"{DELIMITER}\" {}\r\n",
                quoted(name.as_str())
            );
            write_line(stream, &line).await?;
        }
    }

    let resp = format!("{tag} OK {command} completed\r\n");
    write_line(stream, &resp).await
}

/// Match `name` against a LIST pattern, one pattern character at a
/// time, in O(pattern × name).
fn matches(pattern: &[char], name: &[char]) -> bool {
    // reach[j]: the pattern read so far matches the first j characters.
    let mut reach = vec![false; name.len() + 1];
    reach[0] = true;

    for &p in pattern {
        let mut next: Vec<bool> = Vec::with_capacity(reach.len());
        for (j, &here) in reach.iter().enumerate() {
            let extends = next.last() == Some(&true);
            let cell = match p {
                '*' => here || extends,
                '%' => here || (extends && name[j - 1] != DELIMITER),
                c => j > 0 && reach[j - 1] && name[j - 1] == c,
            };
            next.push(cell);
        }
        reach = next;
    }

    reach[name.len()]
}
