//! Typed views of IMAP data.
//!
//! Server responses from [`async_imap`] are converted into these types at the
//! session boundary so the sync engine never handles raw protocol values.

#![allow(clippy::missing_const_for_fn)]

mod flags;
mod identifiers;
mod mailbox;
mod message;
mod sequence;

pub use flags::{Flag, Flags};
pub use identifiers::{Uid, UidValidity};
pub use mailbox::{MailboxInfo, MailboxStatus, SpecialUse};
pub use message::{Envelope, FetchedMessage};
pub use sequence::UidSet;
