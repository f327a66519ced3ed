//! Mailbox names
//!
//! Mailbox names compare case-insensitively, so `inbox`, `Inbox` and
//! `INBOX` all refer to the same mailbox. The name a client used when
//! creating a mailbox is kept for display; INBOX is always displayed
//! in upper case.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A mailbox name with its case-folded lookup key.
///
/// # Examples
///
/// ```
/// use mailsink::MailboxName;
///
/// let inbox = MailboxName::from("inbox");
/// assert_eq!(inbox.as_str(), "INBOX");
/// assert!(inbox.is_inbox());
///
/// let custom = MailboxName::from("My Projects");
/// assert_eq!(custom.as_str(), "My Projects");
/// assert_eq!(custom.key(), "my projects");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MailboxName {
    display: String,
    key: String,
}

impl MailboxName {
    /// The name of the mailbox every principal owns.
    pub const INBOX: &'static str = "INBOX";

    #[must_use]
    pub fn inbox() -> Self {
        Self::from(Self::INBOX)
    }

    /// The name as shown to clients.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// The case-folded form used for lookups.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.key == "inbox"
    }
}

impl PartialEq for MailboxName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for MailboxName {}

impl std::hash::Hash for MailboxName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for MailboxName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MailboxName {
    fn from(s: &str) -> Self {
        let key = s.to_lowercase();
        let display = if key == "inbox" {
            Self::INBOX.to_string()
        } else {
            s.to_string()
        };
        Self { display, key }
    }
}

impl From<String> for MailboxName {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<MailboxName> for String {
    fn from(name: MailboxName) -> Self {
        name.display
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_name() {
        assert_eq!(MailboxName::inbox().as_str(), "INBOX");
    }

    #[test]
    fn inbox_case_insensitive() {
        assert_eq!(MailboxName::from("inbox"), MailboxName::inbox());
        assert_eq!(MailboxName::from("Inbox").as_str(), "INBOX");
        assert!(MailboxName::from("iNbOx").is_inbox());
    }

    #[test]
    fn other_names_compare_case_insensitively() {
        assert_eq!(MailboxName::from("Sent"), MailboxName::from("SENT"));
        assert_eq!(MailboxName::from("Sent").as_str(), "Sent");
        assert_ne!(MailboxName::from("Sent"), MailboxName::from("Trash"));
    }

    #[test]
    fn display_keeps_original_case() {
        assert_eq!(format!("{}", MailboxName::from("My Stuff")), "My Stuff");
    }
}
