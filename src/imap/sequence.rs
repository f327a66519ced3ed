//! Resolve IMAP sequence sets against the session's view of a mailbox.
//!
//! A set such as `1,3:5,7:*` addresses messages either by position
//! (plain FETCH/STORE/COPY) or by UID (the `UID` forms). `*` stands
//! for the highest position or UID the client knows about. The view is
//! the list of known UIDs in position order.

use crate::error::{Error, Result};
use imap_codec::imap_types::sequence::{SeqOrUid, Sequence, SequenceSet};
use std::collections::BTreeSet;

/// How a sequence set addresses messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    Position,
    Uid,
}

impl Addressing {
    #[must_use]
    pub const fn from_uid_flag(uid: bool) -> Self {
        if uid { Self::Uid } else { Self::Position }
    }
}

/// Expand the set to `(low, high)` bounds with `*` replaced by `max`.
fn bounds(set: &SequenceSet, max: u32) -> Vec<(u32, u32)> {
    let value = |v: &SeqOrUid| match v {
        SeqOrUid::Value(v) => v.get(),
        SeqOrUid::Asterisk => max,
    };

    set.0
        .as_ref()
        .iter()
        .map(|seq| match seq {
            Sequence::Single(v) => (value(v), value(v)),
            Sequence::Range(a, b) => {
                let (a, b) = (value(a), value(b));
                (a.min(b), a.max(b))
            }
        })
        .collect()
}

/// Return the 0-based indices into `uids` of the addressed messages in
/// ascending order.
///
/// Positions outside the view fail with [`Error::NotFound`]. UIDs
/// that match no message are skipped, as RFC 3501 requires.
pub fn resolve(set: &SequenceSet, uids: &[u32], addressing: Addressing) -> Result<Vec<usize>> {
    match addressing {
        Addressing::Position => {
            let count = u32::try_from(uids.len())
                .map_err(|_| Error::ResourceExhausted("Mailbox too large".to_string()))?;
            let mut indices = BTreeSet::new();
            for (low, high) in bounds(set, count) {
                if low == 0 || high > count {
                    return Err(Error::NotFound(format!("message at position {high}")));
                }
                indices.extend((low..=high).map(|pos| pos as usize - 1));
            }
            Ok(indices.into_iter().collect())
        }
        Addressing::Uid => {
            let max_uid = uids.last().copied().unwrap_or(0);
            let ranges = bounds(set, max_uid);
            Ok(uids
                .iter()
                .enumerate()
                .filter(|(_, uid)| ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(*uid)))
                .map(|(idx, _)| idx)
                .collect())
        }
    }
}

/// Whether a message matches a set used as a SEARCH key.
#[must_use]
pub fn contains(set: &SequenceSet, uids: &[u32], index: usize, addressing: Addressing) -> bool {
    match addressing {
        Addressing::Position => {
            let count = u32::try_from(uids.len()).unwrap_or(u32::MAX);
            let Ok(position) = u32::try_from(index + 1) else {
                return false;
            };
            bounds(set, count)
                .iter()
                .any(|(lo, hi)| (*lo..=*hi).contains(&position))
        }
        Addressing::Uid => {
            let max_uid = uids.last().copied().unwrap_or(0);
            uids.get(index).is_some_and(|uid| {
                bounds(set, max_uid)
                    .iter()
                    .any(|(lo, hi)| (*lo..=*hi).contains(uid))
            })
        }
    }
}
