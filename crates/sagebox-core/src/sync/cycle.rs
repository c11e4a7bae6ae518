//! One sync cycle for one mailbox.
//!
//! The cycle examines the mailbox, decides between an incremental pass and
//! a full resync, fetches new messages batch by batch (committing each batch
//! with its cursor), then re-checks the flags of a window of known messages.
//! Cancellation is honoured between batches; whatever was committed before
//! stays committed.

use chrono::{DateTime, Utc};
use sagebox_imap::Uid;
use tokio_util::sync::CancellationToken;

use super::fetcher::{self, EnvelopeBatches};
use super::phase::{MailboxGuard, SyncPhase};
use super::reconciler::{self, CycleDecision};
use super::report::MailboxReport;
use crate::account::{AccountConfig, SyncSettings};
use crate::error::{Error, Result};
use crate::index::{IndexStore, MailboxEntry, ReconciliationPlan, SyncCursor};
use crate::remote::RemoteSession;

/// Per-account knobs a cycle needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOptions {
    /// Messages per UID FETCH.
    pub batch_size: usize,
    /// Known UIDs re-checked per cycle.
    pub flag_window: usize,
    /// Interval between whole-set flag passes.
    pub full_reconcile_interval: std::time::Duration,
    /// Fetch bodies together with envelopes.
    pub prefetch_bodies: bool,
}

impl CycleOptions {
    /// Options for `account`, falling back to `settings`.
    #[must_use]
    pub fn new(account: &AccountConfig, settings: &SyncSettings) -> Self {
        Self {
            batch_size: account.batch_size(settings),
            flag_window: settings.flag_window,
            full_reconcile_interval: settings.full_reconcile_interval,
            prefetch_bodies: settings.prefetch_bodies,
        }
    }
}

/// Drives one mailbox through a cycle.
#[derive(Debug)]
pub struct MailboxCycle<'a, St: IndexStore> {
    store: &'a St,
    options: &'a CycleOptions,
    guard: &'a MailboxGuard,
    cancel: &'a CancellationToken,
}

impl<'a, St: IndexStore> MailboxCycle<'a, St> {
    /// Creates a cycle. `guard` must be the claim for the mailbox being
    /// synced.
    #[must_use]
    pub const fn new(
        store: &'a St,
        options: &'a CycleOptions,
        guard: &'a MailboxGuard,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            store,
            options,
            guard,
            cancel,
        }
    }

    /// Runs the cycle, adding counts to `report` as plans are committed.
    ///
    /// # Errors
    ///
    /// Returns the first remote, protocol or store error, or
    /// [`Error::Cancelled`] if cancellation was requested. Batches committed
    /// before the error remain in the index.
    pub async fn run<S: RemoteSession>(
        &self,
        session: &mut S,
        entry: &MailboxEntry,
        report: &mut MailboxReport,
    ) -> Result<()> {
        let path = entry.path.as_str();
        self.guard.advance(SyncPhase::Enumerating);

        let status = session.examine(path).await?;
        let validity = status
            .uid_validity
            .ok_or_else(|| Error::Protocol(format!("no UIDVALIDITY reported for {path}")))?;
        self.store
            .upsert_mailbox(&MailboxEntry {
                message_count: status.exists,
                ..entry.clone()
            })
            .await?;

        let stored = self.store.get_cursor(path).await?;
        let decision = reconciler::decide(stored, validity);

        if let CycleDecision::FullResync { previous, cursor } = decision {
            self.guard.advance(SyncPhase::FullResync);
            let purged = self.store.known_flags(path, Uid::MAX, None).await?.len();
            tracing::warn!(
                mailbox = %path,
                previous = %previous,
                current = %validity,
                purged,
                "UID validity changed, discarding index"
            );
            self.store
                .apply_plan(path, &reconciler::full_resync_plan(cursor))
                .await?;
            report.full_resync = true;
            report.deleted += purged;
        }

        let start = decision.cursor();
        let mut cursor = start;
        self.fetch_new(session, path, &mut cursor, report).await?;

        let now = Utc::now();
        if decision.starts_fresh() {
            // Everything was just fetched, which counts as a full pass.
            self.commit_cursor(path, reconciler::stamped(cursor, now))
                .await?;
        } else {
            self.reconcile_flags(session, path, start, cursor, now, report)
                .await?;
        }

        tracing::info!(
            mailbox = %path,
            inserted = report.inserted,
            updated = report.updated,
            deleted = report.deleted,
            full_resync = report.full_resync,
            "mailbox synced"
        );
        Ok(())
    }

    fn check_cancelled(&self, path: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            tracing::info!(mailbox = %path, "sync cancelled");
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    async fn fetch_new<S: RemoteSession>(
        &self,
        session: &mut S,
        path: &str,
        cursor: &mut SyncCursor,
        report: &mut MailboxReport,
    ) -> Result<()> {
        self.guard.advance(SyncPhase::Fetching);
        let Some(start) = cursor.next_uid() else {
            return Ok(());
        };

        let found = session.search_from(start).await?;
        let new: Vec<Uid> = found.into_iter().filter(|uid| !cursor.covers(*uid)).collect();
        if new.is_empty() {
            tracing::debug!(mailbox = %path, "no new messages");
            return Ok(());
        }

        let mut batches =
            EnvelopeBatches::new(new, self.options.batch_size, self.options.prefetch_bodies);
        tracing::debug!(mailbox = %path, batches = batches.remaining(), "fetching new messages");

        loop {
            self.check_cancelled(path)?;
            let Some(batch) = batches.next_batch(session).await? else {
                break;
            };

            let high_water = batch.high_water();
            let plan = reconciler::plan_inserts(path, batch.messages, *cursor, high_water);
            self.store.apply_plan(path, &plan).await?;

            report.inserted += plan.inserts.len();
            if let Some(next) = plan.cursor {
                *cursor = next;
            }
        }
        Ok(())
    }

    async fn reconcile_flags<S: RemoteSession>(
        &self,
        session: &mut S,
        path: &str,
        start: SyncCursor,
        cursor: SyncCursor,
        now: DateTime<Utc>,
        report: &mut MailboxReport,
    ) -> Result<()> {
        let Some(upto) = start.highest_uid else {
            return Ok(());
        };
        self.guard.advance(SyncPhase::Reconciling);

        let full_pass =
            reconciler::needs_full_pass(&cursor, self.options.full_reconcile_interval, now);
        let limit = (!full_pass).then_some(self.options.flag_window);
        let known = self.store.known_flags(path, upto, limit).await?;
        let uids: Vec<Uid> = known.iter().map(|(uid, _)| *uid).collect();

        let mut server = Vec::with_capacity(uids.len());
        for chunk in uids.chunks(self.options.batch_size.max(1)) {
            self.check_cancelled(path)?;
            server.extend(fetcher::fetch_flags(session, chunk, chunk.len()).await?);
        }

        let mut plan = reconciler::plan_flag_window(&known, &server);
        if full_pass {
            plan.cursor = Some(reconciler::stamped(cursor, now));
        }
        tracing::debug!(
            mailbox = %path,
            window = known.len(),
            full_pass,
            updates = plan.updates.len(),
            deletes = plan.deletes.len(),
            "flag window checked"
        );
        if plan.is_noop() {
            return Ok(());
        }

        self.store.apply_plan(path, &plan).await?;
        report.updated += plan.updates.len();
        report.deleted += plan.deletes.len();
        Ok(())
    }

    async fn commit_cursor(&self, path: &str, cursor: SyncCursor) -> Result<()> {
        let plan = ReconciliationPlan {
            cursor: Some(cursor),
            ..ReconciliationPlan::default()
        };
        Ok(self.store.apply_plan(path, &plan).await?)
    }
}
