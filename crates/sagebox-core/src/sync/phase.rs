//! Per-mailbox sync phases and exclusivity.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::account::AccountId;
use crate::error::{Error, Result};

/// Where a mailbox is in its sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncPhase {
    /// Nothing running.
    #[default]
    Idle,
    /// Reading server state for the mailbox.
    Enumerating,
    /// Pulling new messages in batches.
    Fetching,
    /// Comparing flags of known messages, or applying a user action.
    Reconciling,
    /// Discarding the index after a UID validity change.
    FullResync,
}

impl SyncPhase {
    /// Returns true if moving from `self` to `next` is a valid step.
    ///
    /// Every phase may fall back to `Idle`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Idle)
                | (Self::Idle, Self::Enumerating | Self::FullResync | Self::Reconciling)
                | (Self::Enumerating, Self::Fetching | Self::FullResync)
                | (Self::FullResync, Self::Fetching)
                | (Self::Fetching, Self::Reconciling)
        )
    }

    /// Display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Enumerating => "enumerating",
            Self::Fetching => "fetching",
            Self::Reconciling => "reconciling",
            Self::FullResync => "full_resync",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type LockKey = (AccountId, String);
type PhaseTable = Arc<Mutex<HashMap<LockKey, SyncPhase>>>;

fn lock_table(table: &Mutex<HashMap<LockKey, SyncPhase>>) -> MutexGuard<'_, HashMap<LockKey, SyncPhase>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusivity tokens for mailboxes.
///
/// A mailbox absent from the table is idle. Holding a [`MailboxGuard`] is the
/// only way to write to a mailbox's index entries.
#[derive(Debug, Clone, Default)]
pub struct MailboxLocks {
    table: PhaseTable,
}

impl MailboxLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a mailbox, starting in `phase`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MailboxBusy`] if the mailbox is already claimed.
    pub fn try_begin(
        &self,
        account: &AccountId,
        path: &str,
        phase: SyncPhase,
    ) -> Result<MailboxGuard> {
        let key = (account.clone(), path.to_string());
        let mut table = lock_table(&self.table);
        if let Some(current) = table.get(&key) {
            tracing::debug!(account = %account, mailbox = %path, phase = %current, "mailbox busy");
            return Err(Error::MailboxBusy(path.to_string()));
        }
        table.insert(key.clone(), phase);
        Ok(MailboxGuard {
            table: Arc::clone(&self.table),
            key,
        })
    }

    /// Current phase of a mailbox.
    #[must_use]
    pub fn phase(&self, account: &AccountId, path: &str) -> SyncPhase {
        lock_table(&self.table)
            .get(&(account.clone(), path.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Number of mailboxes currently claimed.
    #[must_use]
    pub fn active(&self) -> usize {
        lock_table(&self.table).len()
    }
}

/// A claimed mailbox. Dropping it returns the mailbox to `Idle`.
#[derive(Debug)]
pub struct MailboxGuard {
    table: PhaseTable,
    key: LockKey,
}

impl MailboxGuard {
    /// Mailbox path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.key.1
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        lock_table(&self.table)
            .get(&self.key)
            .copied()
            .unwrap_or_default()
    }

    /// Moves to `next`. Invalid steps are logged and applied anyway, since
    /// the phase only tracks progress.
    pub fn advance(&self, next: SyncPhase) {
        let mut table = lock_table(&self.table);
        let current = table.get(&self.key).copied().unwrap_or_default();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            tracing::warn!(
                mailbox = %self.key.1,
                from = %current,
                to = %next,
                "unexpected sync phase transition"
            );
        }
        tracing::trace!(mailbox = %self.key.1, from = %current, to = %next, "sync phase");
        table.insert(self.key.clone(), next);
    }
}

impl Drop for MailboxGuard {
    fn drop(&mut self) {
        lock_table(&self.table).remove(&self.key);
    }
}
