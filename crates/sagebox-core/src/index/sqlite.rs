//! `SQLite` index store.

use chrono::{DateTime, Utc};
use sagebox_imap::{Flags, Uid, UidValidity};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use super::model::{
    BodyState, FolderKind, Mailbox, MailboxEntry, MessageRecord, ReconciliationPlan, SyncCursor,
};
use super::store::{IndexStore, StoreResult};
use crate::error::StoreError;

/// Index stored in a `SQLite` database, one database per account.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (or creates) the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> StoreResult<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> StoreResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mailboxes (
                path TEXT PRIMARY KEY,
                delimiter TEXT,
                kind TEXT NOT NULL DEFAULT 'custom',
                message_count INTEGER NOT NULL DEFAULT 0,
                uid_validity INTEGER,
                highest_uid INTEGER NOT NULL DEFAULT 0,
                last_full_reconciliation TEXT,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                mailbox TEXT NOT NULL,
                uid INTEGER NOT NULL,
                flags TEXT NOT NULL DEFAULT '',
                subject TEXT,
                from_json TEXT NOT NULL DEFAULT '[]',
                to_json TEXT NOT NULL DEFAULT '[]',
                cc_json TEXT NOT NULL DEFAULT '[]',
                bcc_json TEXT NOT NULL DEFAULT '[]',
                date_raw TEXT,
                date TEXT,
                message_id TEXT,
                size INTEGER,
                body_state TEXT NOT NULL DEFAULT 'not_fetched',
                body BLOB,
                PRIMARY KEY (mailbox, uid)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_message_id
            ON messages(message_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl IndexStore for SqliteStore {
    async fn list_mailboxes(&self) -> StoreResult<Vec<Mailbox>> {
        let rows = sqlx::query(
            r"
            SELECT path, delimiter, kind, message_count, uid_validity, highest_uid
            FROM mailboxes
            ORDER BY path
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(mailbox_from_row).collect()
    }

    async fn upsert_mailbox(&self, entry: &MailboxEntry) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO mailboxes (path, delimiter, kind, message_count, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                delimiter = excluded.delimiter,
                kind = excluded.kind,
                message_count = excluded.message_count,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&entry.path)
        .bind(&entry.delimiter)
        .bind(entry.kind.as_str())
        .bind(entry.message_count)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_mailbox(&self, path: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(r"DELETE FROM messages WHERE mailbox = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;

        sqlx::query(r"DELETE FROM mailboxes WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_cursor(&self, path: &str) -> StoreResult<Option<SyncCursor>> {
        let row = sqlx::query(
            r"
            SELECT uid_validity, highest_uid, last_full_reconciliation
            FROM mailboxes
            WHERE path = ?
            ",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let Some(uid_validity) = row
            .try_get::<Option<u32>, _>("uid_validity")?
            .and_then(UidValidity::new)
        else {
            return Ok(None);
        };

        let last_full_reconciliation = row
            .try_get::<Option<String>, _>("last_full_reconciliation")?
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        Ok(Some(SyncCursor {
            uid_validity,
            highest_uid: Uid::new(row.try_get::<u32, _>("highest_uid")?),
            last_full_reconciliation,
        }))
    }

    async fn apply_plan(&self, path: &str, plan: &ReconciliationPlan) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let known = sqlx::query(r"SELECT 1 FROM mailboxes WHERE path = ?")
            .bind(path)
            .fetch_optional(&mut *tx)
            .await?;
        if known.is_none() {
            return Err(StoreError::UnknownMailbox(path.to_string()));
        }

        if plan.purge {
            sqlx::query(r"DELETE FROM messages WHERE mailbox = ?")
                .bind(path)
                .execute(&mut *tx)
                .await?;
        }

        for record in &plan.inserts {
            sqlx::query(
                r"
                INSERT INTO messages
                    (mailbox, uid, flags, subject, from_json, to_json, cc_json, bcc_json,
                     date_raw, date, message_id, size, body_state, body)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(mailbox, uid) DO UPDATE SET
                    flags = excluded.flags,
                    subject = excluded.subject,
                    from_json = excluded.from_json,
                    to_json = excluded.to_json,
                    cc_json = excluded.cc_json,
                    bcc_json = excluded.bcc_json,
                    date_raw = excluded.date_raw,
                    date = excluded.date,
                    message_id = excluded.message_id,
                    size = excluded.size,
                    body_state = CASE WHEN excluded.body IS NULL AND messages.body IS NOT NULL
                        THEN messages.body_state ELSE excluded.body_state END,
                    body = COALESCE(excluded.body, messages.body)
                ",
            )
            .bind(path)
            .bind(record.uid.get())
            .bind(record.flags.to_string())
            .bind(&record.subject)
            .bind(to_json(&record.from)?)
            .bind(to_json(&record.to)?)
            .bind(to_json(&record.cc)?)
            .bind(to_json(&record.bcc)?)
            .bind(&record.date_raw)
            .bind(record.date.map(|d| d.to_rfc3339()))
            .bind(&record.message_id)
            .bind(record.size)
            .bind(record.body_state.as_str())
            .bind(&record.body)
            .execute(&mut *tx)
            .await?;
        }

        for update in &plan.updates {
            sqlx::query(r"UPDATE messages SET flags = ? WHERE mailbox = ? AND uid = ?")
                .bind(update.flags.to_string())
                .bind(path)
                .bind(update.uid.get())
                .execute(&mut *tx)
                .await?;
        }

        for uid in &plan.deletes {
            sqlx::query(r"DELETE FROM messages WHERE mailbox = ? AND uid = ?")
                .bind(path)
                .bind(uid.get())
                .execute(&mut *tx)
                .await?;
        }

        if let Some(cursor) = &plan.cursor {
            sqlx::query(
                r"
                UPDATE mailboxes
                SET uid_validity = ?, highest_uid = ?, last_full_reconciliation = ?,
                    updated_at = ?
                WHERE path = ?
                ",
            )
            .bind(cursor.uid_validity.get())
            .bind(cursor.highest_uid.map_or(0, Uid::get))
            .bind(cursor.last_full_reconciliation.map(|t| t.to_rfc3339()))
            .bind(Utc::now().to_rfc3339())
            .bind(path)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn known_flags(
        &self,
        path: &str,
        upto: Uid,
        limit: Option<usize>,
    ) -> StoreResult<Vec<(Uid, Flags)>> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));

        let rows = sqlx::query(
            r"
            SELECT uid, flags FROM messages
            WHERE mailbox = ? AND uid <= ?
            ORDER BY uid DESC
            LIMIT ?
            ",
        )
        .bind(path)
        .bind(upto.get())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let uid = uid_from_row(row)?;
                let flags: String = row.try_get("flags")?;
                Ok((uid, Flags::parse(&flags)))
            })
            .collect()
    }

    async fn get_message(&self, path: &str, uid: Uid) -> StoreResult<Option<MessageRecord>> {
        let row = sqlx::query(
            r"
            SELECT mailbox, uid, flags, subject, from_json, to_json, cc_json, bcc_json,
                   date_raw, date, message_id, size, body_state, body
            FROM messages
            WHERE mailbox = ? AND uid = ?
            ",
        )
        .bind(path)
        .bind(uid.get())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(message_from_row).transpose()
    }

    async fn store_body(&self, path: &str, uid: Uid, body: &[u8]) -> StoreResult<()> {
        sqlx::query(
            r"
            UPDATE messages SET body = ?, body_state = ?
            WHERE mailbox = ? AND uid = ?
            ",
        )
        .bind(body)
        .bind(BodyState::Full.as_str())
        .bind(path)
        .bind(uid.get())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn uid_from_row(row: &SqliteRow) -> StoreResult<Uid> {
    let raw: u32 = row.try_get("uid")?;
    Uid::new(raw).ok_or_else(|| StoreError::Corrupt(format!("message with UID {raw}")))
}

fn mailbox_from_row(row: &SqliteRow) -> StoreResult<Mailbox> {
    let kind: String = row.try_get("kind")?;
    Ok(Mailbox {
        path: row.try_get("path")?,
        delimiter: row.try_get("delimiter")?,
        kind: FolderKind::parse(&kind),
        uid_validity: row
            .try_get::<Option<u32>, _>("uid_validity")?
            .and_then(UidValidity::new),
        highest_uid: Uid::new(row.try_get("highest_uid")?),
        message_count: row.try_get("message_count")?,
    })
}

fn message_from_row(row: &SqliteRow) -> StoreResult<MessageRecord> {
    let flags: String = row.try_get("flags")?;
    let from_json: String = row.try_get("from_json")?;
    let to_json: String = row.try_get("to_json")?;
    let cc_json: String = row.try_get("cc_json")?;
    let bcc_json: String = row.try_get("bcc_json")?;
    let body_state: String = row.try_get("body_state")?;
    let date = row
        .try_get::<Option<String>, _>("date")?
        .as_deref()
        .map(parse_timestamp)
        .transpose()?;

    Ok(MessageRecord {
        mailbox: row.try_get("mailbox")?,
        uid: uid_from_row(row)?,
        flags: Flags::parse(&flags),
        subject: row.try_get("subject")?,
        from: from_json_column(&from_json)?,
        to: from_json_column(&to_json)?,
        cc: from_json_column(&cc_json)?,
        bcc: from_json_column(&bcc_json)?,
        date_raw: row.try_get("date_raw")?,
        date,
        message_id: row.try_get("message_id")?,
        size: row.try_get("size")?,
        body_state: BodyState::parse(&body_state)
            .ok_or_else(|| StoreError::Corrupt(format!("body state {body_state:?}")))?,
        body: row.try_get("body")?,
    })
}

fn to_json(addresses: &[String]) -> StoreResult<String> {
    serde_json::to_string(addresses).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn from_json_column(raw: &str) -> StoreResult<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {raw:?}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::index::model::FlagUpdate;
    use sagebox_imap::Flag;

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    fn entry(path: &str, count: u32) -> MailboxEntry {
        MailboxEntry {
            path: path.into(),
            delimiter: Some("/".into()),
            kind: FolderKind::from_name(path),
            message_count: count,
        }
    }

    fn record(n: u32) -> MessageRecord {
        MessageRecord {
            mailbox: "INBOX".into(),
            uid: uid(n),
            flags: [Flag::Answered].into_iter().collect(),
            subject: Some(format!("message {n}")),
            from: vec!["Alice <alice@example.com>".into()],
            to: vec!["bob@example.com".into()],
            cc: vec!["Carol <carol@example.com>".into()],
            bcc: vec!["dave@example.com".into()],
            date_raw: Some("Mon, 2 Jun 2025 09:00:00 +0000".into()),
            date: crate::index::model::parse_date("Mon, 2 Jun 2025 09:00:00 +0000"),
            message_id: Some(format!("<{n}@example.com>")),
            size: Some(512),
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

    async fn store_with_inbox() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_mailbox(&entry("INBOX", 3)).await.unwrap();
        store
    }

    mod mailbox_tests {
        use super::*;

        #[tokio::test]
        async fn new_mailbox_has_no_cursor() {
            let store = store_with_inbox().await;
            assert!(store.get_cursor("INBOX").await.unwrap().is_none());

            let listed = store.list_mailboxes().await.unwrap();
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].kind, FolderKind::Inbox);
            assert_eq!(listed[0].message_count, 3);
            assert!(listed[0].highest_uid.is_none());
        }

        #[tokio::test]
        async fn upsert_preserves_cursor() {
            let store = store_with_inbox().await;
            let plan = ReconciliationPlan {
                cursor: Some(cursor(11, 40)),
                ..ReconciliationPlan::default()
            };
            store.apply_plan("INBOX", &plan).await.unwrap();
            store.upsert_mailbox(&entry("INBOX", 41)).await.unwrap();

            assert_eq!(store.get_cursor("INBOX").await.unwrap(), Some(cursor(11, 40)));
            let listed = store.list_mailboxes().await.unwrap();
            assert_eq!(listed[0].message_count, 41);
            assert_eq!(listed[0].uid_validity, UidValidity::new(11));
        }

        #[tokio::test]
        async fn remove_drops_messages() {
            let store = store_with_inbox().await;
            let plan = ReconciliationPlan {
                inserts: vec![record(1)],
                cursor: Some(cursor(1, 1)),
                ..ReconciliationPlan::default()
            };
            store.apply_plan("INBOX", &plan).await.unwrap();
            store.remove_mailbox("INBOX").await.unwrap();

            assert!(store.list_mailboxes().await.unwrap().is_empty());
            assert!(store.get_message("INBOX", uid(1)).await.unwrap().is_none());
        }
    }

    mod plan_tests {
        use super::*;

        #[tokio::test]
        async fn record_round_trip() {
            let store = store_with_inbox().await;
            let plan = ReconciliationPlan {
                inserts: vec![record(5)],
                ..ReconciliationPlan::default()
            };
            store.apply_plan("INBOX", &plan).await.unwrap();

            let loaded = store.get_message("INBOX", uid(5)).await.unwrap().unwrap();
            assert_eq!(loaded, record(5));
        }

        #[tokio::test]
        async fn duplicate_inserts_do_not_duplicate() {
            let store = store_with_inbox().await;
            let plan = ReconciliationPlan {
                inserts: vec![record(1), record(2)],
                cursor: Some(cursor(1, 2)),
                ..ReconciliationPlan::default()
            };
            store.apply_plan("INBOX", &plan).await.unwrap();
            store.apply_plan("INBOX", &plan).await.unwrap();

            let known = store.known_flags("INBOX", uid(100), None).await.unwrap();
            assert_eq!(known.len(), 2);
        }

        #[tokio::test]
        async fn unknown_mailbox_rolls_back() {
            let store = store_with_inbox().await;
            let err = store
                .apply_plan(
                    "Missing",
                    &ReconciliationPlan {
                        inserts: vec![record(1)],
                        ..ReconciliationPlan::default()
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::UnknownMailbox(_)));
            assert!(store.get_message("Missing", uid(1)).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn purge_updates_deletes_and_cursor() {
            let store = store_with_inbox().await;
            store
                .apply_plan(
                    "INBOX",
                    &ReconciliationPlan {
                        inserts: (1..=4).map(record).collect(),
                        cursor: Some(cursor(1, 4)),
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
                        deletes: vec![uid(3)],
                        ..ReconciliationPlan::default()
                    },
                )
                .await
                .unwrap();

            let known = store.known_flags("INBOX", uid(4), None).await.unwrap();
            assert_eq!(
                known,
                vec![
                    (uid(4), record(4).flags),
                    (uid(2), seen),
                    (uid(1), record(1).flags),
                ]
            );

            store
                .apply_plan(
                    "INBOX",
                    &ReconciliationPlan {
                        purge: true,
                        cursor: Some(cursor(2, 0)),
                        ..ReconciliationPlan::default()
                    },
                )
                .await
                .unwrap();
            assert!(store.known_flags("INBOX", uid(4), None).await.unwrap().is_empty());
            assert_eq!(store.get_cursor("INBOX").await.unwrap(), Some(cursor(2, 0)));
        }

        #[tokio::test]
        async fn full_reconciliation_timestamp_persists() {
            let store = store_with_inbox().await;
            let stamped = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc);
            let mut with_stamp = cursor(3, 9);
            with_stamp.last_full_reconciliation = Some(stamped);

            store
                .apply_plan(
                    "INBOX",
                    &ReconciliationPlan {
                        cursor: Some(with_stamp),
                        ..ReconciliationPlan::default()
                    },
                )
                .await
                .unwrap();

            let loaded = store.get_cursor("INBOX").await.unwrap().unwrap();
            assert_eq!(loaded.last_full_reconciliation, Some(stamped));
        }
    }

    mod body_tests {
        use super::*;

        #[tokio::test]
        async fn store_body_marks_full_and_survives_reinsert() {
            let store = store_with_inbox().await;
            let plan = ReconciliationPlan {
                inserts: vec![record(1)],
                ..ReconciliationPlan::default()
            };
            store.apply_plan("INBOX", &plan).await.unwrap();
            store
                .store_body("INBOX", uid(1), b"Subject: hi\r\n\r\nbody")
                .await
                .unwrap();
            store.apply_plan("INBOX", &plan).await.unwrap();

            let loaded = store.get_message("INBOX", uid(1)).await.unwrap().unwrap();
            assert_eq!(loaded.body_state, BodyState::Full);
            assert_eq!(loaded.body.as_deref(), Some(&b"Subject: hi\r\n\r\nbody"[..]));
        }
    }

    #[tokio::test]
    async fn known_flags_limit() {
        let store = store_with_inbox().await;
        store
            .apply_plan(
                "INBOX",
                &ReconciliationPlan {
                    inserts: (1..=6).map(record).collect(),
                    ..ReconciliationPlan::default()
                },
            )
            .await
            .unwrap();

        let window = store.known_flags("INBOX", uid(5), Some(3)).await.unwrap();
        let uids: Vec<u32> = window.iter().map(|(u, _)| u.get()).collect();
        assert_eq!(uids, vec![5, 4, 3]);
    }
}
