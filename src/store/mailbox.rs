//! Mailboxes and the messages they own

use super::name::MailboxName;
use crate::error::{Error, Result};
use crate::flag::{self, Flag, FlagSet, StoreMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A stored message.
///
/// - `uid`: per-mailbox identifier, strictly increasing in arrival
///   order and never reused, even after the message is expunged.
/// - `flags`: the current flag set.
/// - `received`: arrival time, reported as the IMAP INTERNALDATE.
/// - `raw`: the complete message (trace headers, headers and body).
///
/// Cloning is cheap; the content is shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub uid: u32,
    pub flags: FlagSet,
    pub received: DateTime<Utc>,
    pub raw: Arc<[u8]>,
}

impl Message {
    #[must_use]
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    #[must_use]
    pub fn has_flag(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }
}

/// Point-in-time summary of a mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxStatus {
    pub name: MailboxName,
    pub exists: usize,
    pub unseen: usize,
    /// Position (1-based) of the first message without `\Seen`.
    pub first_unseen: Option<usize>,
    pub uid_next: u32,
    pub uid_validity: u32,
}

/// A message removed by an expunge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpungedMessage {
    pub uid: u32,
    /// 1-based position the message held right before the expunge.
    pub position: usize,
}

/// A named, ordered collection of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    name: MailboxName,
    uid_validity: u32,
    uid_next: u32,
    #[serde(default)]
    subscribed: bool,
    messages: Vec<Message>,
}

impl Mailbox {
    pub(crate) const fn new(name: MailboxName, uid_validity: u32) -> Self {
        Self {
            name,
            uid_validity,
            uid_next: 1,
            subscribed: false,
            messages: Vec::new(),
        }
    }

    pub(crate) const fn name(&self) -> &MailboxName {
        &self.name
    }

    pub(crate) const fn uid_validity(&self) -> u32 {
        self.uid_validity
    }

    pub(crate) fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub(crate) const fn subscribed(&self) -> bool {
        self.subscribed
    }

    pub(crate) const fn set_subscribed(&mut self, subscribed: bool) {
        self.subscribed = subscribed;
    }

    pub(crate) fn append(
        &mut self,
        raw: Arc<[u8]>,
        flags: FlagSet,
        received: DateTime<Utc>,
    ) -> Result<Message> {
        let uid = self.uid_next;
        self.uid_next = uid
            .checked_add(1)
            .ok_or_else(|| {
                Error::ResourceExhausted(format!("UID space of {} exhausted", self.name))
            })?;

        let message = Message {
            uid,
            flags,
            received,
            raw,
        };
        self.messages.push(message.clone());
        Ok(message)
    }

    pub(crate) fn set_flags(
        &mut self,
        uid: u32,
        mode: StoreMode,
        flags: &FlagSet,
    ) -> Result<FlagSet> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.uid == uid)
            .ok_or_else(|| Error::NotFound(format!("message UID {uid} in {}", self.name)))?;

        flag::apply(&mut message.flags, mode, flags);
        Ok(message.flags.clone())
    }

    /// Remove every `\Deleted` message. Surviving messages keep their
    /// UIDs; only their positions shift.
    pub(crate) fn expunge(&mut self) -> Vec<ExpungedMessage> {
        self.remove_where(|m| m.has_flag(&Flag::Deleted))
    }

    /// Take out the messages with the given UIDs, flags untouched, in
    /// ascending UID order.
    pub(crate) fn take(&mut self, uids: &[u32]) -> Vec<Message> {
        let taken: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| uids.contains(&m.uid))
            .cloned()
            .collect();
        self.remove_where(|m| uids.contains(&m.uid));
        taken
    }

    fn remove_where(&mut self, doomed: impl Fn(&Message) -> bool) -> Vec<ExpungedMessage> {
        let mut removed = Vec::new();
        let mut position = 0;
        self.messages.retain(|m| {
            position += 1;
            let remove = doomed(m);
            if remove {
                removed.push(ExpungedMessage {
                    uid: m.uid,
                    position,
                });
            }
            !remove
        });
        removed
    }

    pub(crate) fn status(&self) -> MailboxStatus {
        let first_unseen = self
            .messages
            .iter()
            .position(|m| !m.has_flag(&Flag::Seen))
            .map(|idx| idx + 1);

        MailboxStatus {
            name: self.name.clone(),
            exists: self.messages.len(),
            unseen: self.messages.iter().filter(|m| !m.has_flag(&Flag::Seen)).count(),
            first_unseen,
            uid_next: self.uid_next,
            uid_validity: self.uid_validity,
        }
    }
}
