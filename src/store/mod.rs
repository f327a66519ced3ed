//! Shared message store
//!
//! The store is the only state shared between sessions. It is an
//! ordinary value: the server owns one behind an `Arc` and hands a
//! clone of that handle to every session.
//!
//! Locking is two-level. The account table and each account's mailbox
//! table sit behind `RwLock`s that are only held long enough to look up
//! or insert an entry. Every mailbox has its own `Mutex`, so appends,
//! flag updates and expunges on one mailbox are serialized while work
//! on other mailboxes proceeds independently. No lock is ever held
//! across an `.await`.

mod mailbox;
mod name;

pub use mailbox::{ExpungedMessage, MailboxStatus, Message};
pub use name::MailboxName;

use crate::error::{Error, Result};
use crate::flag::{FlagSet, StoreMode};
use chrono::{DateTime, Utc};
use mailbox::Mailbox;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

type SharedMailbox = Arc<Mutex<Mailbox>>;

#[derive(Debug, Default)]
struct Account {
    mailboxes: RwLock<HashMap<MailboxName, SharedMailbox>>,
}

/// In-memory store of every principal's mailboxes.
#[derive(Debug)]
pub struct MessageStore {
    accounts: RwLock<HashMap<String, Arc<Account>>>,
    next_uid_validity: AtomicU32,
    next_delivery_id: AtomicU64,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a login name or mail address to the principal that owns
/// the mailboxes.
///
/// Principals are case-insensitive and an address resolves to its
/// local part, so mail sent to `Foo2@bar.com` is read by `LOGIN foo2`.
///
/// ```
/// assert_eq!(mailsink::principal_of("<Foo2@Bar.com>"), "foo2");
/// assert_eq!(mailsink::principal_of("foo2"), "foo2");
/// ```
#[must_use]
pub fn principal_of(login_or_address: &str) -> String {
    let trimmed = login_or_address
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>');
    let local = trimmed.rsplit_once('@').map_or(trimmed, |(local, _)| local);
    local.to_lowercase()
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            next_uid_validity: AtomicU32::new(1),
            next_delivery_id: AtomicU64::new(1),
        }
    }

    /// Create the mailbox unless it already exists. Idempotent.
    pub fn create_mailbox_if_absent(&self, principal: &str, name: &str) -> MailboxStatus {
        let account = self.account_or_create(principal);
        let name = MailboxName::from(name);

        if let Some(existing) = read(&account.mailboxes).get(&name) {
            return lock(existing).status();
        }

        let mut mailboxes = write(&account.mailboxes);
        let shared = mailboxes
            .entry(name.clone())
            .or_insert_with(|| {
                debug!(principal, mailbox = %name, "Creating mailbox");
                Arc::new(Mutex::new(Mailbox::new(name, self.allocate_uid_validity())))
            })
            .clone();
        drop(mailboxes);

        lock(&shared).status()
    }

    /// Create a mailbox that must not exist yet.
    pub fn create_mailbox(&self, principal: &str, name: &str) -> Result<MailboxStatus> {
        let account = self.account_or_create(principal);
        let name = MailboxName::from(name);

        let mut mailboxes = write(&account.mailboxes);
        if mailboxes.contains_key(&name) {
            return Err(Error::BadSequence(format!("Mailbox {name} already exists")));
        }
        let mailbox = Mailbox::new(name.clone(), self.allocate_uid_validity());
        let status = mailbox.status();
        mailboxes.insert(name, Arc::new(Mutex::new(mailbox)));
        drop(mailboxes);

        Ok(status)
    }

    /// Delete a mailbox and every message in it. INBOX cannot be deleted.
    pub fn delete_mailbox(&self, principal: &str, name: &str) -> Result<()> {
        let name = MailboxName::from(name);
        if name.is_inbox() {
            return Err(Error::BadSequence("INBOX cannot be deleted".to_string()));
        }

        let account = self.account(principal)?;
        let removed = write(&account.mailboxes).remove(&name);
        removed
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("mailbox {name}")))
    }

    /// Names of the principal's mailboxes in creation order.
    #[must_use]
    pub fn list_mailboxes(&self, principal: &str) -> Vec<MailboxName> {
        let Ok(account) = self.account(principal) else {
            return Vec::new();
        };

        let mut entries: Vec<(u32, MailboxName)> = read(&account.mailboxes)
            .values()
            .map(|shared| {
                let mailbox = lock(shared);
                (mailbox.uid_validity(), mailbox.name().clone())
            })
            .collect();
        entries.sort_by_key(|(validity, _)| *validity);
        entries.into_iter().map(|(_, name)| name).collect()
    }

    /// Append a message to an existing mailbox.
    ///
    /// The UID is assigned under the mailbox lock, and the message is
    /// visible to every other session once this returns.
    pub fn append_message(
        &self,
        principal: &str,
        mailbox: &str,
        raw: impl Into<Arc<[u8]>>,
    ) -> Result<Message> {
        self.append_with(principal, mailbox, raw.into(), FlagSet::new(), Utc::now())
    }

    /// Append into the principal's INBOX, creating it first if needed.
    pub fn deliver(&self, principal: &str, raw: impl Into<Arc<[u8]>>) -> Result<Message> {
        self.create_mailbox_if_absent(principal, MailboxName::INBOX);
        self.append_message(principal, MailboxName::INBOX, raw)
    }

    /// Append with initial flags and an explicit internal date.
    pub fn append_with(
        &self,
        principal: &str,
        mailbox: &str,
        raw: Arc<[u8]>,
        flags: FlagSet,
        received: DateTime<Utc>,
    ) -> Result<Message> {
        let shared = self.mailbox(principal, mailbox)?;
        let message = lock(&shared).append(raw, flags, received)?;
        debug!(principal, mailbox, uid = message.uid, size = message.size(), "Appended message");
        Ok(message)
    }

    /// Snapshot of the mailbox's messages in arrival order.
    pub fn list_messages(&self, principal: &str, mailbox: &str) -> Result<Vec<Message>> {
        let shared = self.mailbox(principal, mailbox)?;
        let messages = lock(&shared).messages().to_vec();
        Ok(messages)
    }

    pub fn status(&self, principal: &str, mailbox: &str) -> Result<MailboxStatus> {
        let shared = self.mailbox(principal, mailbox)?;
        let status = lock(&shared).status();
        Ok(status)
    }

    /// Update the flags of one message and return its new flag set.
    ///
    /// Fails with [`Error::NotFound`] if the message was expunged.
    pub fn set_flags(
        &self,
        principal: &str,
        mailbox: &str,
        uid: u32,
        mode: StoreMode,
        flags: &FlagSet,
    ) -> Result<FlagSet> {
        let shared = self.mailbox(principal, mailbox)?;
        lock(&shared).set_flags(uid, mode, flags)
    }

    /// Remove every `\Deleted` message. Surviving messages keep their
    /// UIDs. The result is ordered by ascending position.
    pub fn expunge(&self, principal: &str, mailbox: &str) -> Result<Vec<ExpungedMessage>> {
        let shared = self.mailbox(principal, mailbox)?;
        let removed = lock(&shared).expunge();
        if !removed.is_empty() {
            debug!(principal, mailbox, count = removed.len(), "Expunged messages");
        }
        Ok(removed)
    }

    /// Copy messages into another existing mailbox, keeping their flags
    /// and internal dates. Returns `(source UID, new UID)` pairs.
    pub fn copy_messages(
        &self,
        principal: &str,
        from: &str,
        uids: &[u32],
        to: &str,
    ) -> Result<Vec<(u32, u32)>> {
        let target = self.mailbox(principal, to)?;
        let sources: Vec<Message> = self
            .list_messages(principal, from)?
            .into_iter()
            .filter(|m| uids.contains(&m.uid))
            .collect();

        let mut target = lock(&target);
        sources
            .into_iter()
            .map(|m| {
                let copy = target.append(m.raw, m.flags, m.received)?;
                Ok((m.uid, copy.uid))
            })
            .collect()
    }

    /// Move messages into another existing mailbox. They get new UIDs
    /// there and are gone from `from`. Returns `(source UID, new UID)`
    /// pairs; UIDs no longer in `from` are skipped.
    pub fn move_messages(
        &self,
        principal: &str,
        from: &str,
        uids: &[u32],
        to: &str,
    ) -> Result<Vec<(u32, u32)>> {
        let target = self.mailbox(principal, to)?;
        let source = self.mailbox(principal, from)?;

        // One lock at a time, so moving within a mailbox cannot deadlock.
        let taken = lock(&source).take(uids);
        let mut target = lock(&target);
        let moved = taken
            .into_iter()
            .map(|m| {
                let copy = target.append(m.raw, m.flags, m.received)?;
                Ok((m.uid, copy.uid))
            })
            .collect::<Result<Vec<_>>>()?;
        drop(target);

        debug!(principal, from, to, count = moved.len(), "Moved messages");
        Ok(moved)
    }

    /// Add or remove an existing mailbox from the subscribed set
    /// reported by LSUB.
    pub fn set_subscribed(&self, principal: &str, name: &str, subscribed: bool) -> Result<()> {
        let shared = self.mailbox(principal, name)?;
        lock(&shared).set_subscribed(subscribed);
        Ok(())
    }

    /// Names of the subscribed mailboxes in creation order.
    #[must_use]
    pub fn list_subscribed(&self, principal: &str) -> Vec<MailboxName> {
        self.list_mailboxes(principal)
            .into_iter()
            .filter(|name| {
                self.mailbox(principal, name.as_str())
                    .is_ok_and(|shared| lock(&shared).subscribed())
            })
            .collect()
    }

    /// Identifier handed back to SMTP clients for an accepted message.
    pub fn next_delivery_id(&self) -> String {
        let id = self.next_delivery_id.fetch_add(1, Ordering::Relaxed);
        format!("{id:016X}")
    }

    /// Load a snapshot previously written by [`MessageStore::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| Error::Persistence(format!("Failed to read {}: {e}", path.display())))?;
        let snapshot: Snapshot = serde_json::from_slice(&data)
            .map_err(|e| Error::Persistence(format!("Invalid snapshot {}: {e}", path.display())))?;

        let store = Self::new();
        store.next_uid_validity.store(snapshot.next_uid_validity, Ordering::SeqCst);
        store.next_delivery_id.store(snapshot.next_delivery_id, Ordering::SeqCst);
        {
            let mut accounts = write(&store.accounts);
            for (principal, mailboxes) in snapshot.accounts {
                let table = mailboxes
                    .into_iter()
                    .map(|mb| (mb.name().clone(), Arc::new(Mutex::new(mb))))
                    .collect();
                accounts.insert(
                    principal,
                    Arc::new(Account {
                        mailboxes: RwLock::new(table),
                    }),
                );
            }
        }

        info!("Loaded message store from {}", path.display());
        Ok(store)
    }

    /// Write every account, mailbox and message to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let accounts = read(&self.accounts)
            .iter()
            .map(|(principal, account)| {
                let mailboxes = read(&account.mailboxes)
                    .values()
                    .map(|shared| lock(shared).clone())
                    .collect();
                (principal.clone(), mailboxes)
            })
            .collect();

        let snapshot = Snapshot {
            next_uid_validity: self.next_uid_validity.load(Ordering::SeqCst),
            next_delivery_id: self.next_delivery_id.load(Ordering::SeqCst),
            accounts,
        };
        let data = serde_json::to_vec(&snapshot)
            .map_err(|e| Error::Persistence(format!("Failed to encode snapshot: {e}")))?;
        std::fs::write(path, data)
            .map_err(|e| Error::Persistence(format!("Failed to write {}: {e}", path.display())))?;

        info!("Saved message store to {}", path.display());
        Ok(())
    }

    fn allocate_uid_validity(&self) -> u32 {
        self.next_uid_validity.fetch_add(1, Ordering::SeqCst)
    }

    fn account(&self, principal: &str) -> Result<Arc<Account>> {
        read(&self.accounts)
            .get(&principal_of(principal))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("principal {principal}")))
    }

    fn account_or_create(&self, principal: &str) -> Arc<Account> {
        let key = principal_of(principal);
        if let Some(account) = read(&self.accounts).get(&key) {
            return account.clone();
        }
        write(&self.accounts).entry(key).or_default().clone()
    }

    fn mailbox(&self, principal: &str, name: &str) -> Result<SharedMailbox> {
        let account = self.account(principal)?;
        let name = MailboxName::from(name);
        let shared = read(&account.mailboxes)
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("mailbox {name}")))?;
        Ok(shared)
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    next_uid_validity: u32,
    next_delivery_id: u64,
    accounts: BTreeMap<String, Vec<Mailbox>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
