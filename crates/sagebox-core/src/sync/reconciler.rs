//! Plan construction.
//!
//! Everything here is pure: the cycle driver gathers server data, asks for
//! a plan, and hands the plan to the store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sagebox_imap::{FetchedMessage, Flags, Uid, UidValidity};

use crate::index::{FlagUpdate, MessageRecord, ReconciliationPlan, SyncCursor};

/// What a cycle does for one mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDecision {
    /// Fetch from `cursor.next_uid()` and check the flag window.
    Incremental {
        /// Cursor the cycle starts from.
        cursor: SyncCursor,
        /// Nothing has been indexed for this mailbox before.
        initial: bool,
    },
    /// Discard the index and fetch everything again.
    FullResync {
        /// Validity of the discarded records.
        previous: UidValidity,
        /// Cursor for the new epoch.
        cursor: SyncCursor,
    },
}

impl CycleDecision {
    /// The cursor the cycle starts from.
    #[must_use]
    pub const fn cursor(&self) -> SyncCursor {
        match self {
            Self::Incremental { cursor, .. } | Self::FullResync { cursor, .. } => *cursor,
        }
    }

    /// Returns true if the cycle fetches the mailbox from scratch.
    #[must_use]
    pub const fn starts_fresh(&self) -> bool {
        matches!(
            self,
            Self::FullResync { .. } | Self::Incremental { initial: true, .. }
        )
    }
}

/// Compares the stored cursor with the server's UID validity.
#[must_use]
pub fn decide(stored: Option<SyncCursor>, server: UidValidity) -> CycleDecision {
    match stored {
        None => CycleDecision::Incremental {
            cursor: SyncCursor::fresh(server),
            initial: true,
        },
        Some(cursor) if cursor.uid_validity == server => CycleDecision::Incremental {
            cursor,
            initial: false,
        },
        Some(cursor) => CycleDecision::FullResync {
            previous: cursor.uid_validity,
            cursor: SyncCursor::fresh(server),
        },
    }
}

/// The plan that empties a mailbox and resets its cursor for a new epoch.
#[must_use]
pub fn full_resync_plan(cursor: SyncCursor) -> ReconciliationPlan {
    ReconciliationPlan {
        purge: true,
        cursor: Some(SyncCursor::fresh(cursor.uid_validity)),
        ..ReconciliationPlan::default()
    }
}

/// Insert plan for one fetched batch.
///
/// Records already covered by `cursor` are skipped. The cursor advances to
/// `high_water`, the highest UID requested in the batch, so UIDs that
/// vanished between SEARCH and FETCH are not asked for again.
#[must_use]
pub fn plan_inserts(
    mailbox: &str,
    fetched: Vec<FetchedMessage>,
    cursor: SyncCursor,
    high_water: Option<Uid>,
) -> ReconciliationPlan {
    let inserts: Vec<MessageRecord> = fetched
        .into_iter()
        .filter(|message| !cursor.covers(message.uid))
        .map(|message| MessageRecord::from_fetched(mailbox, message))
        .collect();

    let highest = inserts
        .iter()
        .map(|record| record.uid)
        .chain(high_water)
        .chain(cursor.highest_uid)
        .max();

    ReconciliationPlan {
        inserts,
        cursor: Some(SyncCursor {
            highest_uid: highest,
            ..cursor
        }),
        ..ReconciliationPlan::default()
    }
}

/// Flag plan for a window of known messages.
///
/// `known` holds the indexed flags; `server` the flags the server reported
/// for the same UIDs. Differences become updates and UIDs the server no
/// longer reports become deletes.
#[must_use]
pub fn plan_flag_window(known: &[(Uid, Flags)], server: &[FetchedMessage]) -> ReconciliationPlan {
    let remote: HashMap<Uid, &Flags> = server
        .iter()
        .map(|message| (message.uid, &message.flags))
        .collect();

    let mut updates = Vec::new();
    let mut deletes = Vec::new();
    for (uid, local) in known {
        match remote.get(uid) {
            Some(flags) if *flags != local => updates.push(FlagUpdate {
                uid: *uid,
                flags: (*flags).clone(),
            }),
            Some(_) => {}
            None => deletes.push(*uid),
        }
    }
    updates.sort_by_key(|update| update.uid);
    deletes.sort_unstable();

    ReconciliationPlan {
        updates,
        deletes,
        ..ReconciliationPlan::default()
    }
}

/// Returns true if the flag pass should cover every known UID.
#[must_use]
pub fn needs_full_pass(
    cursor: &SyncCursor,
    interval: std::time::Duration,
    now: DateTime<Utc>,
) -> bool {
    cursor.last_full_reconciliation.is_none_or(|last| {
        now.signed_duration_since(last)
            .to_std()
            .is_ok_and(|elapsed| elapsed >= interval)
    })
}

/// The cursor with `last_full_reconciliation` set to `now`.
#[must_use]
pub const fn stamped(cursor: SyncCursor, now: DateTime<Utc>) -> SyncCursor {
    SyncCursor {
        last_full_reconciliation: Some(now),
        ..cursor
    }
}
