//! In-memory index store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sagebox_imap::{Flags, Uid};

use super::model::{
    BodyState, Mailbox, MailboxEntry, MessageRecord, ReconciliationPlan, SyncCursor,
};
use super::store::{IndexStore, StoreResult};
use crate::error::StoreError;

#[derive(Debug)]
struct MailboxState {
    mailbox: Mailbox,
    cursor: Option<SyncCursor>,
    messages: BTreeMap<Uid, MessageRecord>,
}

/// Index kept in process memory.
///
/// Useful for tests and for short-lived tools that do not need the index to
/// outlive the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    mailboxes: Mutex<HashMap<String, MailboxState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MailboxState>> {
        self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every record of a mailbox, in UID order.
    #[must_use]
    pub fn messages(&self, path: &str) -> Vec<MessageRecord> {
        self.lock()
            .get(path)
            .map(|state| state.messages.values().cloned().collect())
            .unwrap_or_default()
    }

    /// UIDs indexed for a mailbox, ascending.
    #[must_use]
    pub fn uids(&self, path: &str) -> Vec<Uid> {
        self.lock()
            .get(path)
            .map(|state| state.messages.keys().copied().collect())
            .unwrap_or_default()
    }
}

impl IndexStore for MemoryStore {
    async fn list_mailboxes(&self) -> StoreResult<Vec<Mailbox>> {
        let guard = self.lock();
        let mut mailboxes: Vec<Mailbox> = guard
            .values()
            .map(|state| {
                let mut mailbox = state.mailbox.clone();
                if let Some(cursor) = state.cursor {
                    mailbox.uid_validity = Some(cursor.uid_validity);
                    mailbox.highest_uid = cursor.highest_uid;
                }
                mailbox
            })
            .collect();
        mailboxes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(mailboxes)
    }

    async fn upsert_mailbox(&self, entry: &MailboxEntry) -> StoreResult<()> {
        let mut guard = self.lock();
        let state = guard
            .entry(entry.path.clone())
            .or_insert_with(|| MailboxState {
                mailbox: Mailbox {
                    path: entry.path.clone(),
                    delimiter: None,
                    kind: entry.kind,
                    uid_validity: None,
                    highest_uid: None,
                    message_count: 0,
                },
                cursor: None,
                messages: BTreeMap::new(),
            });
        state.mailbox.delimiter.clone_from(&entry.delimiter);
        state.mailbox.kind = entry.kind;
        state.mailbox.message_count = entry.message_count;
        Ok(())
    }

    async fn remove_mailbox(&self, path: &str) -> StoreResult<()> {
        self.lock().remove(path);
        Ok(())
    }

    async fn get_cursor(&self, path: &str) -> StoreResult<Option<SyncCursor>> {
        Ok(self.lock().get(path).and_then(|state| state.cursor))
    }

    async fn apply_plan(&self, path: &str, plan: &ReconciliationPlan) -> StoreResult<()> {
        let mut guard = self.lock();
        let state = guard
            .get_mut(path)
            .ok_or_else(|| StoreError::UnknownMailbox(path.to_string()))?;

        // Work on a copy so a failure part-way leaves the state untouched.
        let mut messages = if plan.purge {
            BTreeMap::new()
        } else {
            state.messages.clone()
        };

        for record in &plan.inserts {
            match messages.get_mut(&record.uid) {
                Some(existing) => merge_insert(existing, record),
                None => {
                    messages.insert(record.uid, record.clone());
                }
            }
        }
        for update in &plan.updates {
            if let Some(existing) = messages.get_mut(&update.uid) {
                existing.flags.clone_from(&update.flags);
            }
        }
        for uid in &plan.deletes {
            messages.remove(uid);
        }

        state.messages = messages;
        if let Some(cursor) = plan.cursor {
            state.cursor = Some(cursor);
        }
        Ok(())
    }

    async fn known_flags(
        &self,
        path: &str,
        upto: Uid,
        limit: Option<usize>,
    ) -> StoreResult<Vec<(Uid, Flags)>> {
        let guard = self.lock();
        let Some(state) = guard.get(path) else {
            return Ok(Vec::new());
        };

        Ok(state
            .messages
            .range(..=upto)
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .map(|(uid, record)| (*uid, record.flags.clone()))
            .collect())
    }

    async fn get_message(&self, path: &str, uid: Uid) -> StoreResult<Option<MessageRecord>> {
        Ok(self
            .lock()
            .get(path)
            .and_then(|state| state.messages.get(&uid))
            .cloned())
    }

    async fn store_body(&self, path: &str, uid: Uid, body: &[u8]) -> StoreResult<()> {
        let mut guard = self.lock();
        if let Some(record) = guard
            .get_mut(path)
            .and_then(|state| state.messages.get_mut(&uid))
        {
            record.body = Some(body.to_vec());
            record.body_state = BodyState::Full;
        }
        Ok(())
    }
}

/// Re-inserting a known UID refreshes its metadata but never drops a body.
fn merge_insert(existing: &mut MessageRecord, incoming: &MessageRecord) {
    let body = if incoming.body.is_some() {
        incoming.body.clone()
    } else {
        existing.body.take()
    };
    let body_state = if body.is_some() {
        BodyState::Full
    } else {
        incoming.body_state
    };

    *existing = MessageRecord {
        body,
        body_state,
        ..incoming.clone()
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::index::model::{FlagUpdate, FolderKind};
    use sagebox_imap::{Flag, UidValidity};

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    fn entry(path: &str) -> MailboxEntry {
        MailboxEntry {
            path: path.into(),
            delimiter: Some("/".into()),
            kind: FolderKind::from_name(path),
            message_count: 0,
        }
    }

    fn record(n: u32) -> MessageRecord {
        MessageRecord {
            mailbox: "INBOX".into(),
            uid: uid(n),
            flags: Flags::new(),
            subject: Some(format!("message {n}")),
            from: Vec::new(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            date_raw: None,
            date: None,
            message_id: None,
            size: Some(100),
            body_state: BodyState::HeadersOnly,
            body: None,
        }
    }

    fn cursor(validity: u32, highest: u32) -> SyncCursor {
        SyncCursor {
            highest_uid: Uid::new(highest),
            ..SyncCursor::fresh(UidValidity::new(validity).unwrap())
        }
    }

    #[tokio::test]
    async fn apply_plan_requires_mailbox() {
        let store = MemoryStore::new();
        let err = store
            .apply_plan("INBOX", &ReconciliationPlan::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownMailbox(_)));
    }

    #[tokio::test]
    async fn inserts_are_idempotent() {
        let store = MemoryStore::new();
        store.upsert_mailbox(&entry("INBOX")).await.unwrap();

        let plan = ReconciliationPlan {
            inserts: vec![record(1), record(2)],
            cursor: Some(cursor(1, 2)),
            ..ReconciliationPlan::default()
        };
        store.apply_plan("INBOX", &plan).await.unwrap();
        store.apply_plan("INBOX", &plan).await.unwrap();

        assert_eq!(store.uids("INBOX"), vec![uid(1), uid(2)]);
        assert_eq!(store.get_cursor("INBOX").await.unwrap(), Some(cursor(1, 2)));
    }

    #[tokio::test]
    async fn purge_then_insert() {
        let store = MemoryStore::new();
        store.upsert_mailbox(&entry("INBOX")).await.unwrap();
        store
            .apply_plan(
                "INBOX",
                &ReconciliationPlan {
                    inserts: vec![record(1), record(2), record(3)],
                    cursor: Some(cursor(1, 3)),
                    ..ReconciliationPlan::default()
                },
            )
            .await
            .unwrap();

        store
            .apply_plan(
                "INBOX",
                &ReconciliationPlan {
                    purge: true,
                    inserts: vec![record(7)],
                    cursor: Some(cursor(2, 7)),
                    ..ReconciliationPlan::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(store.uids("INBOX"), vec![uid(7)]);
    }

    #[tokio::test]
    async fn updates_and_deletes() {
        let store = MemoryStore::new();
        store.upsert_mailbox(&entry("INBOX")).await.unwrap();
        store
            .apply_plan(
                "INBOX",
                &ReconciliationPlan {
                    inserts: vec![record(1), record(2)],
                    ..ReconciliationPlan::default()
                },
            )
            .await
            .unwrap();

        let seen: Flags = [Flag::Seen].into_iter().collect();
        store
            .apply_plan(
                "INBOX",
                &ReconciliationPlan {
                    updates: vec![FlagUpdate {
                        uid: uid(2),
                        flags: seen.clone(),
                    }],
                    deletes: vec![uid(1)],
                    ..ReconciliationPlan::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(store.uids("INBOX"), vec![uid(2)]);
        let message = store.get_message("INBOX", uid(2)).await.unwrap().unwrap();
        assert_eq!(message.flags, seen);
    }

    #[tokio::test]
    async fn known_flags_window() {
        let store = MemoryStore::new();
        store.upsert_mailbox(&entry("INBOX")).await.unwrap();
        store
            .apply_plan(
                "INBOX",
                &ReconciliationPlan {
                    inserts: (1..=5).map(record).collect(),
                    ..ReconciliationPlan::default()
                },
            )
            .await
            .unwrap();

        let window = store.known_flags("INBOX", uid(4), Some(2)).await.unwrap();
        let uids: Vec<u32> = window.iter().map(|(u, _)| u.get()).collect();
        assert_eq!(uids, vec![4, 3]);

        let all = store.known_flags("INBOX", uid(5), None).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn reinsert_keeps_body() {
        let store = MemoryStore::new();
        store.upsert_mailbox(&entry("INBOX")).await.unwrap();
        let plan = ReconciliationPlan {
            inserts: vec![record(1)],
            ..ReconciliationPlan::default()
        };
        store.apply_plan("INBOX", &plan).await.unwrap();
        store.store_body("INBOX", uid(1), b"raw").await.unwrap();
        store.apply_plan("INBOX", &plan).await.unwrap();

        let message = store.get_message("INBOX", uid(1)).await.unwrap().unwrap();
        assert_eq!(message.body_state, BodyState::Full);
        assert_eq!(message.body.as_deref(), Some(&b"raw"[..]));
    }

    #[tokio::test]
    async fn list_reflects_cursor_and_removal() {
        let store = MemoryStore::new();
        store.upsert_mailbox(&entry("INBOX")).await.unwrap();
        store.upsert_mailbox(&entry("Archive")).await.unwrap();
        store
            .apply_plan(
                "INBOX",
                &ReconciliationPlan {
                    cursor: Some(cursor(5, 9)),
                    ..ReconciliationPlan::default()
                },
            )
            .await
            .unwrap();

        let listed = store.list_mailboxes().await.unwrap();
        assert_eq!(listed[0].path, "Archive");
        assert_eq!(listed[0].kind, FolderKind::Archive);
        assert_eq!(listed[1].highest_uid, Uid::new(9));

        store.remove_mailbox("INBOX").await.unwrap();
        assert_eq!(store.list_mailboxes().await.unwrap().len(), 1);
        assert!(store.get_cursor("INBOX").await.unwrap().is_none());
    }
}
