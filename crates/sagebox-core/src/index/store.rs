//! The persistence seam of the engine.

use std::future::Future;

use sagebox_imap::{Flags, Uid};

use super::model::{Mailbox, MailboxEntry, MessageRecord, ReconciliationPlan, SyncCursor};
use crate::error::StoreError;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Local index of one account's mailboxes and messages.
///
/// Implementations must apply each [`ReconciliationPlan`] atomically: either
/// every mutation and the cursor land, or none do.
pub trait IndexStore: Send + Sync + 'static {
    /// Every indexed mailbox, ordered by path.
    fn list_mailboxes(&self) -> impl Future<Output = StoreResult<Vec<Mailbox>>> + Send;

    /// Creates or refreshes a mailbox row. Never touches its cursor.
    fn upsert_mailbox(&self, entry: &MailboxEntry)
    -> impl Future<Output = StoreResult<()>> + Send;

    /// Deletes a mailbox together with its records and cursor.
    fn remove_mailbox(&self, path: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// The cursor of a mailbox, or `None` if it has never been synced.
    fn get_cursor(&self, path: &str) -> impl Future<Output = StoreResult<Option<SyncCursor>>> + Send;

    /// Applies a plan in one transaction.
    ///
    /// Order within the plan: purge, inserts, updates, deletes, cursor.
    fn apply_plan(
        &self,
        path: &str,
        plan: &ReconciliationPlan,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Flags of known messages with UID at or below `upto`, highest first,
    /// at most `limit` entries (all when `None`).
    fn known_flags(
        &self,
        path: &str,
        upto: Uid,
        limit: Option<usize>,
    ) -> impl Future<Output = StoreResult<Vec<(Uid, Flags)>>> + Send;

    /// One message record.
    fn get_message(
        &self,
        path: &str,
        uid: Uid,
    ) -> impl Future<Output = StoreResult<Option<MessageRecord>>> + Send;

    /// Attaches the raw body to a known record and marks it `Full`.
    fn store_body(
        &self,
        path: &str,
        uid: Uid,
        body: &[u8],
    ) -> impl Future<Output = StoreResult<()>> + Send;
}
