//! The service applications talk to.
//!
//! [`SyncService`] owns one connection pool and one index store per
//! account, plus the mailbox exclusivity table shared by syncs and message
//! actions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use sagebox_imap::{Flag, Flags, MailboxStatus, StoreAction, Uid, UidSet};
use tokio_util::sync::CancellationToken;

use crate::account::{
    AccountConfig, AccountId, SyncSettings, validate_account, validate_folder_name,
};
use crate::error::{Error, Result, StoreError};
use crate::index::{
    BodyState, FlagUpdate, FolderKind, IndexStore, Mailbox, MailboxEntry, ReconciliationPlan,
};
use crate::pool::ConnectionPool;
use crate::remote::{Connector, RemoteSession};
use crate::sync::folders;
use crate::sync::{
    CycleOptions, MailboxCycle, MailboxOutcome, MailboxReport, MailboxLocks, SyncPhase,
    SyncReport,
};

/// A flag change requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagChange {
    /// Set `\Seen`.
    MarkRead,
    /// Clear `\Seen`.
    MarkUnread,
    /// Set `\Flagged`.
    Flag,
    /// Clear `\Flagged`.
    Unflag,
}

impl FlagChange {
    /// The STORE action and flag implementing this change.
    #[must_use]
    pub const fn store_item(self) -> (StoreAction, Flag) {
        match self {
            Self::MarkRead => (StoreAction::Add, Flag::Seen),
            Self::MarkUnread => (StoreAction::Remove, Flag::Seen),
            Self::Flag => (StoreAction::Add, Flag::Flagged),
            Self::Unflag => (StoreAction::Remove, Flag::Flagged),
        }
    }

    /// Applies the change to a local flag set.
    pub fn apply(self, flags: &mut Flags) {
        let (action, flag) = self.store_item();
        match action {
            StoreAction::Remove => flags.remove(&flag),
            StoreAction::Add => flags.insert(flag),
        }
    }
}

struct AccountHandle<C: Connector, S: IndexStore> {
    config: AccountConfig,
    options: CycleOptions,
    pool: ConnectionPool<C>,
    store: Arc<S>,
}

/// Sync entry point for a set of accounts.
pub struct SyncService<C: Connector, S: IndexStore> {
    connector: Arc<C>,
    settings: SyncSettings,
    accounts: BTreeMap<AccountId, AccountHandle<C, S>>,
    locks: MailboxLocks,
}

impl<C: Connector, S: IndexStore> std::fmt::Debug for SyncService<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("accounts", &self.accounts.keys().collect::<Vec<_>>())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<C: Connector, S: IndexStore> SyncService<C, S> {
    /// Creates a service with no accounts.
    #[must_use]
    pub fn new(connector: C, settings: SyncSettings) -> Self {
        Self {
            connector: Arc::new(connector),
            settings,
            accounts: BTreeMap::new(),
            locks: MailboxLocks::new(),
        }
    }

    /// Registers an account with its index store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn add_account(&mut self, config: AccountConfig, store: Arc<S>) -> Result<()> {
        validate_account(&config).map_err(Error::InvalidConfig)?;

        let pool = ConnectionPool::new(
            Arc::clone(&self.connector),
            config.clone(),
            self.settings.clone(),
        );
        let options = CycleOptions::new(&config, &self.settings);
        tracing::debug!(account = %config.id, pool_size = pool.size(), "account registered");

        self.accounts.insert(
            config.id.clone(),
            AccountHandle {
                config,
                options,
                pool,
                store,
            },
        );
        Ok(())
    }

    /// Registered accounts, ordered by id.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountConfig> {
        self.accounts.values().map(|handle| &handle.config)
    }

    /// Engine settings.
    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// The exclusivity table.
    #[must_use]
    pub const fn locks(&self) -> &MailboxLocks {
        &self.locks
    }

    /// The index store of an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] for an unknown id.
    pub fn store(&self, id: &AccountId) -> Result<&Arc<S>> {
        Ok(&self.account(id)?.store)
    }

    /// Indexed mailboxes of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the account is unknown or the store fails.
    pub async fn mailboxes(&self, id: &AccountId) -> Result<Vec<Mailbox>> {
        Ok(self.account(id)?.store.list_mailboxes().await?)
    }

    fn account(&self, id: &AccountId) -> Result<&AccountHandle<C, S>> {
        self.accounts
            .get(id)
            .ok_or_else(|| Error::AccountNotFound(id.clone()))
    }

    /// Syncs every mailbox of an account.
    ///
    /// # Errors
    ///
    /// See [`SyncService::sync_account_with_cancel`].
    pub async fn sync_account(&self, id: &AccountId) -> Result<SyncReport> {
        self.sync_account_with_cancel(id, &CancellationToken::new())
            .await
    }

    /// Syncs every mailbox of an account, stopping at the next batch
    /// boundary once `cancel` fires.
    ///
    /// Mailboxes run concurrently, up to the account's pool size. A failing
    /// mailbox is recorded in the report and does not stop the others.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] as soon as any session is rejected, and any
    /// error raised while listing mailboxes. A mailbox whose STATUS fails is
    /// reported as failed and kept in the index.
    pub async fn sync_account_with_cancel(
        &self,
        id: &AccountId,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let account = self.account(id)?;
        let mut report = SyncReport::new(id.clone());
        tracing::info!(account = %id, "account sync started");

        let listing = {
            let mut conn = account.pool.acquire().await?;
            let listed = folders::list_mailboxes(&mut *conn, account.store.as_ref()).await;
            conn.check(listed)?
        };
        report.removed_mailboxes =
            folders::reconcile_mailbox_list(account.store.as_ref(), &listing).await?;
        for (path, err) in &listing.failed {
            report.push(MailboxReport::failed(path, err));
        }

        let mut runs = stream::iter(listing.descriptors.iter())
            .map(|descriptor| self.run_mailbox(account, descriptor.entry(), cancel))
            .buffer_unordered(account.pool.size());

        while let Some(result) = runs.next().await {
            match result {
                Ok(mailbox) => report.push(mailbox),
                Err(err) => {
                    tracing::error!(account = %id, error = %err, "account sync aborted");
                    return Err(err);
                }
            }
        }
        drop(runs);

        report.finish();
        let (inserted, updated, deleted) = report.totals();
        tracing::info!(
            account = %id,
            mailboxes = report.mailboxes.len(),
            inserted,
            updated,
            deleted,
            errors = report.errors.len(),
            "account sync finished"
        );
        Ok(report)
    }

    /// Syncs one mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MailboxBusy`] if the mailbox is already being synced,
    /// [`Error::UnknownMailbox`] if neither the index nor the server knows
    /// it, and any error that aborted the cycle.
    pub async fn sync_mailbox(
        &self,
        id: &AccountId,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<MailboxReport> {
        let account = self.account(id)?;
        let entry = self.resolve_entry(account, path).await?;
        let mut report = MailboxReport::new(path);
        self.cycle_mailbox(account, &entry, cancel, &mut report)
            .await?;
        Ok(report)
    }

    async fn run_mailbox(
        &self,
        account: &AccountHandle<C, S>,
        entry: MailboxEntry,
        cancel: &CancellationToken,
    ) -> Result<MailboxReport> {
        let mut report = MailboxReport::new(&entry.path);
        match self
            .cycle_mailbox(account, &entry, cancel, &mut report)
            .await
        {
            Ok(()) => report.outcome = MailboxOutcome::Completed,
            Err(Error::MailboxBusy(_)) => {
                tracing::info!(mailbox = %entry.path, "mailbox busy, skipped");
                report.outcome = MailboxOutcome::Skipped;
            }
            Err(Error::Cancelled) => report.outcome = MailboxOutcome::Cancelled,
            Err(err) if err.is_fatal_for_account() => return Err(err),
            Err(err) => {
                tracing::warn!(mailbox = %entry.path, error = %err, "mailbox sync failed");
                report.outcome = MailboxOutcome::Failed(err.to_string());
            }
        }
        Ok(report)
    }

    async fn cycle_mailbox(
        &self,
        account: &AccountHandle<C, S>,
        entry: &MailboxEntry,
        cancel: &CancellationToken,
        report: &mut MailboxReport,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let guard = self
            .locks
            .try_begin(&account.config.id, &entry.path, SyncPhase::Enumerating)?;
        let mut conn = account.pool.acquire().await?;

        let cycle = MailboxCycle::new(account.store.as_ref(), &account.options, &guard, cancel);
        let result = cycle.run(&mut *conn, entry, report).await;
        conn.check(result)
    }

    async fn resolve_entry(
        &self,
        account: &AccountHandle<C, S>,
        path: &str,
    ) -> Result<MailboxEntry> {
        let indexed = account.store.list_mailboxes().await?;
        if let Some(mailbox) = indexed.into_iter().find(|m| m.path == path) {
            return Ok(MailboxEntry {
                path: mailbox.path,
                delimiter: mailbox.delimiter,
                kind: mailbox.kind,
                message_count: mailbox.message_count,
            });
        }

        let mut conn = account.pool.acquire().await?;
        let listed = conn.list_mailboxes().await;
        let listed = conn.check(listed)?;
        listed
            .into_iter()
            .find(|info| info.path == path && info.selectable)
            .map(|info| MailboxEntry {
                kind: FolderKind::from_mailbox(&info),
                path: info.path,
                delimiter: info.delimiter,
                message_count: 0,
            })
            .ok_or_else(|| Error::UnknownMailbox(path.to_string()))
    }

    /// Returns the raw RFC 5322 bytes of a message.
    ///
    /// Served from the index when the body is already stored, otherwise
    /// fetched from the server and stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMessage`] if the server does not have the UID
    /// and [`Error::UidValidityChanged`] if the mailbox needs a resync.
    pub async fn fetch_body(&self, id: &AccountId, path: &str, uid: Uid) -> Result<Vec<u8>> {
        let account = self.account(id)?;
        if let Some(record) = account.store.get_message(path, uid).await?
            && record.body_state == BodyState::Full
            && let Some(body) = record.body
        {
            tracing::debug!(mailbox = %path, uid = %uid, "body served from index");
            return Ok(body);
        }

        let mut conn = account.pool.acquire().await?;
        let opened = conn.examine(path).await;
        let status = conn.check(opened)?;
        ensure_same_validity(account.store.as_ref(), path, &status).await?;
        let fetched = conn.fetch_body(uid).await;
        let body = conn.check(fetched)?.ok_or_else(|| Error::UnknownMessage {
            mailbox: path.to_string(),
            uid: uid.get(),
        })?;
        drop(conn);

        account.store.store_body(path, uid, &body).await?;
        tracing::debug!(mailbox = %path, uid = %uid, bytes = body.len(), "body fetched");
        Ok(body)
    }

    /// Changes a flag on messages, on the server and then in the index.
    ///
    /// Returns the number of indexed messages updated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MailboxBusy`] while the mailbox is being synced,
    /// [`Error::UidValidityChanged`] if the mailbox needs a resync, or any
    /// remote or store error.
    pub async fn set_flags(
        &self,
        id: &AccountId,
        path: &str,
        uids: &[Uid],
        change: FlagChange,
    ) -> Result<usize> {
        let account = self.account(id)?;
        let Some(set) = UidSet::from_uids(uids.iter().copied()) else {
            return Ok(0);
        };
        let _guard = self
            .locks
            .try_begin(id, path, SyncPhase::Reconciling)?;

        let (action, flag) = change.store_item();
        let flags: Flags = std::iter::once(flag).collect();
        let returned = {
            let mut conn = account.pool.acquire().await?;
            let opened = conn.select(path).await;
            let status = conn.check(opened)?;
            ensure_same_validity(account.store.as_ref(), path, &status).await?;
            let stored = conn.store_flags(&set, action, &flags).await;
            conn.check(stored)?
        };
        let reported: HashMap<Uid, Flags> = returned
            .into_iter()
            .map(|message| (message.uid, message.flags))
            .collect();

        let mut updates = Vec::new();
        for uid in sorted_unique(uids) {
            let Some(record) = account.store.get_message(path, uid).await? else {
                continue;
            };
            // Servers may omit the FETCH echo; fall back to applying locally.
            let flags = reported.get(&uid).cloned().unwrap_or_else(|| {
                let mut flags = record.flags;
                change.apply(&mut flags);
                flags
            });
            updates.push(FlagUpdate { uid, flags });
        }

        let updated = updates.len();
        if updated > 0 {
            account
                .store
                .apply_plan(
                    path,
                    &ReconciliationPlan {
                        updates,
                        ..ReconciliationPlan::default()
                    },
                )
                .await?;
        }
        tracing::info!(mailbox = %path, ?change, updated, "flags changed");
        Ok(updated)
    }

    /// Moves messages to `target` and drops them from the source index.
    ///
    /// The target mailbox picks them up on its next sync. Returns the number
    /// of UIDs moved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MailboxBusy`] while the source is being synced,
    /// [`Error::UidValidityChanged`] if the source needs a resync, or any
    /// remote or store error.
    pub async fn move_messages(
        &self,
        id: &AccountId,
        path: &str,
        uids: &[Uid],
        target: &str,
    ) -> Result<usize> {
        let account = self.account(id)?;
        if path == target {
            return Ok(0);
        }
        let Some(set) = UidSet::from_uids(uids.iter().copied()) else {
            return Ok(0);
        };
        let _guard = self
            .locks
            .try_begin(id, path, SyncPhase::Reconciling)?;

        {
            let mut conn = account.pool.acquire().await?;
            let opened = conn.select(path).await;
            let status = conn.check(opened)?;
            ensure_same_validity(account.store.as_ref(), path, &status).await?;
            let moved = conn.move_messages(&set, target).await;
            conn.check(moved)?;
        }

        let moved = sorted_unique(uids);
        let count = moved.len();
        let plan = ReconciliationPlan {
            deletes: moved,
            ..ReconciliationPlan::default()
        };
        match account.store.apply_plan(path, &plan).await {
            Ok(()) | Err(StoreError::UnknownMailbox(_)) => {}
            Err(err) => return Err(err.into()),
        }
        tracing::info!(mailbox = %path, target = %target, count, "messages moved");
        Ok(count)
    }

    /// Moves messages to the account's trash mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMailbox`] if no indexed mailbox is a trash
    /// folder, otherwise as [`SyncService::move_messages`].
    pub async fn move_to_trash(&self, id: &AccountId, path: &str, uids: &[Uid]) -> Result<usize> {
        let trash = self.mailbox_of_kind(id, FolderKind::Trash).await?;
        self.move_messages(id, path, uids, &trash).await
    }

    /// Moves messages from the trash mailbox back to the inbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMailbox`] if no indexed mailbox is a trash
    /// folder, otherwise as [`SyncService::move_messages`].
    pub async fn restore_from_trash(&self, id: &AccountId, uids: &[Uid]) -> Result<usize> {
        let trash = self.mailbox_of_kind(id, FolderKind::Trash).await?;
        let inbox = match self.mailbox_of_kind(id, FolderKind::Inbox).await {
            Ok(path) => path,
            Err(Error::UnknownMailbox(_)) => "INBOX".to_string(),
            Err(err) => return Err(err),
        };
        self.move_messages(id, &trash, uids, &inbox).await
    }

    /// Permanently deletes every message in the trash mailbox, on the
    /// server and in the index. Returns the number of messages removed
    /// from the server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMailbox`] if no indexed mailbox is a trash
    /// folder, [`Error::MailboxBusy`] while it is being synced,
    /// [`Error::UidValidityChanged`] if it needs a resync, or any remote or
    /// store error.
    pub async fn clear_trash(&self, id: &AccountId) -> Result<usize> {
        let account = self.account(id)?;
        let trash = self.mailbox_of_kind(id, FolderKind::Trash).await?;
        let _guard = self
            .locks
            .try_begin(id, &trash, SyncPhase::Reconciling)?;

        let removed = {
            let mut conn = account.pool.acquire().await?;
            let opened = conn.select(&trash).await;
            let status = conn.check(opened)?;
            ensure_same_validity(account.store.as_ref(), &trash, &status).await?;

            let found = conn.search_from(Uid::MIN).await;
            let found = conn.check(found)?;
            match UidSet::from_uids(found) {
                Some(set) => {
                    let deleted: Flags = std::iter::once(Flag::Deleted).collect();
                    let stored = conn.store_flags(&set, StoreAction::Add, &deleted).await;
                    conn.check(stored)?;
                    let expunged = conn.expunge().await;
                    conn.check(expunged)?
                }
                None => 0,
            }
        };

        let indexed: Vec<Uid> = account
            .store
            .known_flags(&trash, Uid::MAX, None)
            .await?
            .into_iter()
            .map(|(uid, _)| uid)
            .collect();
        if !indexed.is_empty() {
            let plan = ReconciliationPlan {
                deletes: indexed,
                ..ReconciliationPlan::default()
            };
            account.store.apply_plan(&trash, &plan).await?;
        }
        tracing::info!(mailbox = %trash, removed, "trash cleared");
        Ok(removed)
    }

    async fn mailbox_of_kind(&self, id: &AccountId, kind: FolderKind) -> Result<String> {
        self.account(id)?
            .store
            .list_mailboxes()
            .await?
            .into_iter()
            .find(|mailbox| mailbox.kind == kind)
            .map(|mailbox| mailbox.path)
            .ok_or_else(|| Error::UnknownMailbox(kind.to_string()))
    }

    /// Creates a mailbox on the server and indexes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMailboxName`] for a name that fails
    /// [`validate_folder_name`], [`Error::MailboxExists`] if the server
    /// already lists it, or any remote or store error.
    pub async fn create_mailbox(&self, id: &AccountId, name: &str) -> Result<()> {
        let account = self.account(id)?;
        check_folder_name(name)?;
        let _guard = self.locks.try_begin(id, name, SyncPhase::Enumerating)?;

        let delimiter = {
            let mut conn = account.pool.acquire().await?;
            let listed = conn.list_mailboxes().await;
            let listed = conn.check(listed)?;
            if listed.iter().any(|info| info.path == name) {
                return Err(Error::MailboxExists(name.to_string()));
            }
            let created = conn.create_mailbox(name).await;
            conn.check(created)?;
            listed.into_iter().find_map(|info| info.delimiter)
        };

        account
            .store
            .upsert_mailbox(&MailboxEntry {
                path: name.to_string(),
                delimiter,
                kind: FolderKind::from_name(name),
                message_count: 0,
            })
            .await?;
        tracing::info!(account = %id, mailbox = %name, "mailbox created");
        Ok(())
    }

    /// Renames a user mailbox on the server and in the index.
    ///
    /// The index drops the old mailbox's messages; the next sync fetches
    /// them under the new name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMailboxName`] for a bad new name,
    /// [`Error::UnknownMailbox`] if `from` is not indexed,
    /// [`Error::ProtectedMailbox`] for a standard mailbox,
    /// [`Error::MailboxExists`] if `to` is taken, [`Error::MailboxBusy`] while
    /// either name is claimed, or any remote or store error.
    pub async fn rename_mailbox(&self, id: &AccountId, from: &str, to: &str) -> Result<()> {
        let account = self.account(id)?;
        check_folder_name(to)?;
        let indexed = account.store.list_mailboxes().await?;
        let source = indexed
            .iter()
            .find(|mailbox| mailbox.path == from)
            .ok_or_else(|| Error::UnknownMailbox(from.to_string()))?;
        if source.kind != FolderKind::Custom {
            return Err(Error::ProtectedMailbox(from.to_string()));
        }
        if from == to {
            return Ok(());
        }
        if indexed.iter().any(|mailbox| mailbox.path == to) {
            return Err(Error::MailboxExists(to.to_string()));
        }

        let _from_guard = self.locks.try_begin(id, from, SyncPhase::Enumerating)?;
        let _to_guard = self.locks.try_begin(id, to, SyncPhase::Enumerating)?;
        {
            let mut conn = account.pool.acquire().await?;
            let renamed = conn.rename_mailbox(from, to).await;
            conn.check(renamed)?;
        }

        account.store.remove_mailbox(from).await?;
        account
            .store
            .upsert_mailbox(&MailboxEntry {
                path: to.to_string(),
                delimiter: source.delimiter.clone(),
                kind: FolderKind::from_name(to),
                message_count: source.message_count,
            })
            .await?;
        tracing::info!(account = %id, from = %from, to = %to, "mailbox renamed");
        Ok(())
    }

    /// Deletes a mailbox on the server and drops it from the index.
    ///
    /// A mailbox the server no longer lists is still removed from the
    /// index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMailbox`] if neither the index nor the server
    /// knows it, [`Error::MailboxBusy`] while it is claimed, or any remote or
    /// store error.
    pub async fn delete_mailbox(&self, id: &AccountId, path: &str) -> Result<()> {
        let account = self.account(id)?;
        let _guard = self.locks.try_begin(id, path, SyncPhase::Enumerating)?;
        let indexed = account
            .store
            .list_mailboxes()
            .await?
            .iter()
            .any(|mailbox| mailbox.path == path);

        let on_server = {
            let mut conn = account.pool.acquire().await?;
            let listed = conn.list_mailboxes().await;
            let on_server = conn.check(listed)?.iter().any(|info| info.path == path);
            if on_server {
                let deleted = conn.delete_mailbox(path).await;
                conn.check(deleted)?;
            }
            on_server
        };

        match (on_server, indexed) {
            (false, false) => return Err(Error::UnknownMailbox(path.to_string())),
            (false, true) => {
                tracing::warn!(mailbox = %path, "mailbox not on server, removing from index only");
            }
            (true, _) => tracing::info!(account = %id, mailbox = %path, "mailbox deleted"),
        }
        if indexed {
            account.store.remove_mailbox(path).await?;
        }
        Ok(())
    }

    /// Validates the account and performs a login round trip.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`], [`Error::Auth`] or
    /// [`Error::ConnectionUnavailable`].
    pub async fn check_connection(&self, id: &AccountId) -> Result<()> {
        let account = self.account(id)?;
        validate_account(&account.config).map_err(Error::InvalidConfig)?;

        let mut session = account.pool.connect_unpooled().await?;
        session.noop().await?;
        session.logout().await?;
        tracing::info!(account = %id, host = %account.config.host, "connection check passed");
        Ok(())
    }

    /// Logs out idle sessions of every account.
    pub async fn shutdown(&self) {
        for handle in self.accounts.values() {
            handle.pool.close_idle().await;
        }
    }
}

fn check_folder_name(name: &str) -> Result<()> {
    validate_folder_name(name).map_err(|reason| Error::InvalidMailboxName {
        name: name.to_string(),
        reason,
    })
}

/// Refuses to act on indexed UIDs once the server's UID validity differs
/// from the stored cursor.
async fn ensure_same_validity<St: IndexStore>(
    store: &St,
    path: &str,
    status: &MailboxStatus,
) -> Result<()> {
    let Some(cursor) = store.get_cursor(path).await? else {
        return Ok(());
    };
    if status.uid_validity == Some(cursor.uid_validity) {
        return Ok(());
    }
    tracing::warn!(
        mailbox = %path,
        indexed = %cursor.uid_validity,
        "UID validity changed since the last sync"
    );
    Err(Error::UidValidityChanged {
        mailbox: path.to_string(),
    })
}

fn sorted_unique(uids: &[Uid]) -> Vec<Uid> {
    let mut uids = uids.to_vec();
    uids.sort_unstable();
    uids.dedup();
    uids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_changes_map_to_store_items() {
        assert_eq!(
            FlagChange::MarkRead.store_item(),
            (StoreAction::Add, Flag::Seen)
        );
        assert_eq!(
            FlagChange::Unflag.store_item(),
            (StoreAction::Remove, Flag::Flagged)
        );
    }

    #[test]
    fn flag_changes_apply_locally() {
        let mut flags = Flags::parse("\\Seen \\Flagged");
        FlagChange::MarkUnread.apply(&mut flags);
        assert!(!flags.is_seen());
        assert!(flags.is_flagged());

        FlagChange::Unflag.apply(&mut flags);
        FlagChange::MarkRead.apply(&mut flags);
        assert!(flags.is_seen());
        assert!(!flags.is_flagged());
    }
}
