//! Message flags
//!
//! Provides a strongly-typed enum for message flags instead of raw
//! strings. Standard system flags have dedicated variants; arbitrary
//! keyword flags use the `Keyword` variant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A message flag.
///
/// System flags (prefixed with `\` in the IMAP protocol) have
/// dedicated variants. User-defined keyword flags use [`Flag::Keyword`].
///
/// # Examples
///
/// ```
/// use mailsink::Flag;
///
/// let seen = Flag::Seen;
/// assert_eq!(seen.as_imap_str(), "\\Seen");
/// assert_eq!(Flag::parse("\\seen"), Flag::Seen);
///
/// let kw = Flag::Keyword("$Important".to_string());
/// assert_eq!(kw.as_imap_str(), "$Important");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
    /// Message is a draft (`\Draft`).
    Draft,
    /// A user-defined keyword flag (no `\` prefix).
    Keyword(String),
}

/// The flags carried by one message, kept in a stable order.
pub type FlagSet = BTreeSet<Flag>;

/// How a flag update combines with the flags already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Replace the whole set.
    Replace,
    /// Union with the current set.
    Add,
    /// Difference from the current set.
    Remove,
}

impl Flag {
    /// The system flags every mailbox advertises.
    pub const SYSTEM: [Self; 5] = [
        Self::Answered,
        Self::Flagged,
        Self::Deleted,
        Self::Seen,
        Self::Draft,
    ];

    /// Parse the wire form of a flag. System flag names are matched
    /// case-insensitively; anything else becomes a keyword.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "\\seen" => Self::Seen,
            "\\answered" => Self::Answered,
            "\\flagged" => Self::Flagged,
            "\\deleted" => Self::Deleted,
            "\\draft" => Self::Draft,
            _ => Self::Keyword(s.to_string()),
        }
    }

    /// The IMAP wire representation of this flag.
    ///
    /// System flags include the leading backslash (e.g. `\Seen`).
    /// Keyword flags are returned as-is.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Keyword(kw) => kw,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}

/// Apply `flags` to `current` according to `mode`.
pub fn apply(current: &mut FlagSet, mode: StoreMode, flags: &FlagSet) {
    match mode {
        StoreMode::Replace => current.clone_from(flags),
        StoreMode::Add => current.extend(flags.iter().cloned()),
        StoreMode::Remove => current.retain(|f| !flags.contains(f)),
    }
}

/// Render a flag set as a parenthesized IMAP list, e.g. `(\Seen \Deleted)`.
#[must_use]
pub fn to_imap_list(flags: &FlagSet) -> String {
    let names: Vec<&str> = flags.iter().map(Flag::as_imap_str).collect();
    format!("({})", names.join(" "))
}
