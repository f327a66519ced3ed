//! IMAP session state.

use crate::store::{MailboxName, Message};

/// Where a session stands in the IMAP state diagram.
///
/// The selected mailbox is held by name only and is looked up again in
/// the store on every command, so a mailbox deleted by another session
/// is noticed rather than kept alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NotAuthenticated,
    Authenticated { principal: String },
    Selected(Selection),
}

/// The mailbox opened by SELECT or EXAMINE.
///
/// `known_uids` is the mailbox as this client sees it: the UIDs it has
/// been told about, in position order. Message positions in commands
/// and responses refer to this list, not to the live mailbox. A UID
/// expunged by another session stays in the list until the removal
/// has been reported with `* n EXPUNGE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub principal: String,
    pub mailbox: MailboxName,
    /// Opened with EXAMINE: flags and contents cannot be changed.
    pub read_only: bool,
    pub known_uids: Vec<u32>,
}

/// What [`Selection::refresh`] found that the client was not told yet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Changes {
    /// Positions to report as `* n EXPUNGE`, highest first.
    pub expunged: Vec<usize>,
    /// New message count, set when messages arrived.
    pub exists: Option<usize>,
}

impl SessionState {
    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        match self {
            Self::NotAuthenticated => None,
            Self::Authenticated { principal } => Some(principal),
            Self::Selected(selection) => Some(&selection.principal),
        }
    }

    /// Drop the selection, keeping the login.
    #[must_use]
    pub fn deselect(self) -> Self {
        match self {
            Self::Selected(selection) => Self::Authenticated {
                principal: selection.principal,
            },
            other => other,
        }
    }
}

impl Selection {
    /// Open `mailbox` with the client seeing every message in `live`.
    #[must_use]
    pub fn new(principal: &str, mailbox: MailboxName, read_only: bool, live: &[Message]) -> Self {
        Self {
            principal: principal.to_string(),
            mailbox,
            read_only,
            known_uids: live.iter().map(|m| m.uid).collect(),
        }
    }

    /// Message count as last reported to the client.
    #[must_use]
    pub fn exists(&self) -> usize {
        self.known_uids.len()
    }

    /// Pair every known position with its live message. A position
    /// whose message was expunged elsewhere maps to `None`.
    #[must_use]
    pub fn view<'a>(&self, live: &'a [Message]) -> Vec<Option<&'a Message>> {
        self.known_uids
            .iter()
            .map(|uid| find(live, *uid))
            .collect()
    }

    /// Catch up with the live mailbox.
    ///
    /// Messages that arrived since the last refresh are always added.
    /// Vanished messages are only dropped when `report_expunges` is set,
    /// since the client must be told about each one with `* n EXPUNGE`
    /// and that is not allowed during every command.
    pub fn refresh(&mut self, live: &[Message], report_expunges: bool) -> Changes {
        let mut changes = Changes::default();

        if report_expunges {
            changes.expunged = self
                .known_uids
                .iter()
                .enumerate()
                .rev()
                .filter(|(_, uid)| find(live, **uid).is_none())
                .map(|(idx, _)| idx + 1)
                .collect();
            if !changes.expunged.is_empty() {
                self.known_uids.retain(|uid| find(live, *uid).is_some());
            }
        }

        // UIDs only grow, so anything past the last known UID is new.
        let last = self.known_uids.last().copied().unwrap_or(0);
        let before = self.known_uids.len();
        self.known_uids
            .extend(live.iter().map(|m| m.uid).filter(|uid| *uid > last));
        if self.known_uids.len() > before {
            changes.exists = Some(self.known_uids.len());
        }

        changes
    }
}

/// Live messages are in ascending UID order.
fn find(live: &[Message], uid: u32) -> Option<&Message> {
    live.binary_search_by_key(&uid, |m| m.uid)
        .ok()
        .map(|idx| &live[idx])
}
