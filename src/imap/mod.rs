//! IMAP access side
//!
//! Commands are decoded with `imap-codec` into strongly-typed
//! `Command` values. [`run_session`] tracks the session state and routes
//! each command to a handler in [`handlers`]; handlers read and mutate
//! the shared [`MessageStore`](crate::MessageStore) and write the
//! untagged and tagged responses.
//!
//! Messages are addressed by position (the IMAP message sequence
//! number) or, in the `UID` command forms, by their stable UID.

pub mod handlers;
mod sequence;
mod session;
mod state;
mod view;

pub use session::run_session;
pub use state::{Selection, SessionState};
