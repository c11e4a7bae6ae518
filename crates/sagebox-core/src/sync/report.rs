//! Sync results.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::account::AccountId;

/// How a mailbox cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum MailboxOutcome {
    /// The cycle ran to the end.
    #[default]
    Completed,
    /// The cycle aborted; batches committed before the failure remain.
    Failed(String),
    /// Another sync or action held the mailbox.
    Skipped,
    /// Cancelled at a batch boundary.
    Cancelled,
}

/// Counts for one mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxReport {
    /// Mailbox path.
    pub path: String,
    /// Records inserted.
    pub inserted: usize,
    /// Records whose flags changed.
    pub updated: usize,
    /// Records removed, including those purged by a full resync.
    pub deleted: usize,
    /// The UID validity changed and the mailbox was re-fetched.
    pub full_resync: bool,
    /// Final state.
    pub outcome: MailboxOutcome,
}

impl MailboxReport {
    /// An empty report for `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            inserted: 0,
            updated: 0,
            deleted: 0,
            full_resync: false,
            outcome: MailboxOutcome::Completed,
        }
    }

    /// A report for a mailbox that failed before its cycle started.
    #[must_use]
    pub fn failed(path: impl Into<String>, error: &impl std::fmt::Display) -> Self {
        Self {
            outcome: MailboxOutcome::Failed(error.to_string()),
            ..Self::new(path)
        }
    }

    /// Returns true if nothing changed in the index.
    #[must_use]
    pub const fn is_unchanged(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0 && !self.full_resync
    }
}

/// Result of syncing one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Account synced.
    pub account_id: AccountId,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub finished_at: DateTime<Utc>,
    /// Per-mailbox results, ordered by path.
    pub mailboxes: Vec<MailboxReport>,
    /// Local mailboxes removed because the server no longer has them.
    pub removed_mailboxes: Vec<String>,
    /// Error messages of failed mailboxes.
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Starts a report for `account_id`.
    #[must_use]
    pub fn new(account_id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            started_at: now,
            finished_at: now,
            mailboxes: Vec::new(),
            removed_mailboxes: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Records a mailbox result.
    pub fn push(&mut self, mailbox: MailboxReport) {
        if let MailboxOutcome::Failed(error) = &mailbox.outcome {
            self.errors.push(format!("{}: {error}", mailbox.path));
        }
        self.mailboxes.push(mailbox);
    }

    /// Sorts the entries and stamps the end time.
    pub fn finish(&mut self) {
        self.mailboxes.sort_by(|a, b| a.path.cmp(&b.path));
        self.finished_at = Utc::now();
    }

    /// Entry for `path`.
    #[must_use]
    pub fn mailbox(&self, path: &str) -> Option<&MailboxReport> {
        self.mailboxes.iter().find(|m| m.path == path)
    }

    /// Returns true if every mailbox completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.mailboxes
            .iter()
            .all(|m| m.outcome == MailboxOutcome::Completed)
    }

    /// Sum of inserted, updated and deleted records.
    #[must_use]
    pub fn totals(&self) -> (usize, usize, usize) {
        self.mailboxes.iter().fold((0, 0, 0), |(i, u, d), m| {
            (i + m.inserted, u + m.updated, d + m.deleted)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_collected() {
        let mut report = SyncReport::new(AccountId::new("work"));
        let mut inbox = MailboxReport::new("INBOX");
        inbox.inserted = 3;
        let mut sent = MailboxReport::new("Sent");
        sent.outcome = MailboxOutcome::Failed("Network error: reset".into());
        sent.updated = 1;

        report.push(sent);
        report.push(inbox);
        report.finish();

        assert_eq!(report.mailboxes[0].path, "INBOX");
        assert_eq!(report.errors, vec!["Sent: Network error: reset".to_string()]);
        assert!(!report.is_success());
        assert_eq!(report.totals(), (3, 1, 0));
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn failed_report_carries_the_error() {
        let report = MailboxReport::failed("Broken", &"Protocol error: no UIDVALIDITY");
        assert_eq!(
            report.outcome,
            MailboxOutcome::Failed("Protocol error: no UIDVALIDITY".into())
        );
        assert!(report.is_unchanged());
    }

    #[test]
    fn serializes_outcome_with_tag() {
        let mut mailbox = MailboxReport::new("INBOX");
        mailbox.outcome = MailboxOutcome::Failed("boom".into());
        let json = serde_json::to_value(&mailbox).unwrap();
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["error"], "boom");

        let skipped = serde_json::to_value(MailboxOutcome::Skipped).unwrap();
        assert_eq!(skipped["status"], "skipped");
    }
}
