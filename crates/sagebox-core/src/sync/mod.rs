//! Synchronization engine.
//!
//! - [`folders`] enumerates the server's mailboxes and keeps the index's
//!   mailbox list in line with it.
//! - [`fetcher`] issues batched UID FETCH commands.
//! - [`reconciler`] turns server observations into [`ReconciliationPlan`]s.
//! - [`cycle`] drives one mailbox through enumerate, fetch and reconcile.
//! - [`phase`] tracks each mailbox's phase and enforces exclusivity.
//!
//! [`ReconciliationPlan`]: crate::index::ReconciliationPlan

pub mod cycle;
pub mod fetcher;
pub mod folders;
pub mod phase;
pub mod reconciler;
mod report;

pub use cycle::{CycleOptions, MailboxCycle};
pub use folders::{MailboxDescriptor, MailboxListing};
pub use phase::{MailboxGuard, MailboxLocks, SyncPhase};
pub use reconciler::CycleDecision;
pub use report::{MailboxOutcome, MailboxReport, SyncReport};
