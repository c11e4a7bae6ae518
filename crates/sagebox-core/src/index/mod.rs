//! Local message index.
//!
//! The [`IndexStore`] trait is the only persistence seam of the engine. Two
//! implementations ship with the crate: [`SqliteStore`] for durable indexes
//! and [`MemoryStore`] for tests and throwaway runs.

mod memory;
mod model;
mod sqlite;
mod store;

pub use memory::MemoryStore;
pub use model::{
    BodyState, FlagUpdate, FolderKind, Mailbox, MailboxEntry, MessageRecord, ReconciliationPlan,
    SyncCursor, parse_date,
};
pub use sqlite::SqliteStore;
pub use store::{IndexStore, StoreResult};
