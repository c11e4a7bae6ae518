//! The IMAP seam of the engine.
//!
//! [`Connector`] opens sessions and [`RemoteSession`] is the set of commands
//! a sync cycle issues. [`ImapConnector`] implements both on top of
//! `sagebox-imap`; tests substitute an in-process server.

use std::future::Future;

use sagebox_imap::{FetchedMessage, Flags, MailboxInfo, MailboxStatus, StoreAction, Uid, UidSet};

use crate::account::{AccountConfig, SyncSettings};
use crate::error::Result;

/// An authenticated connection to one account's server.
pub trait RemoteSession: Send + 'static {
    /// LIST every mailbox.
    fn list_mailboxes(&mut self) -> impl Future<Output = Result<Vec<MailboxInfo>>> + Send;

    /// STATUS without selecting.
    fn status(&mut self, path: &str) -> impl Future<Output = Result<MailboxStatus>> + Send;

    /// EXAMINE (read-only open).
    fn examine(&mut self, path: &str) -> impl Future<Output = Result<MailboxStatus>> + Send;

    /// SELECT (read-write open).
    fn select(&mut self, path: &str) -> impl Future<Output = Result<MailboxStatus>> + Send;

    /// UIDs at or above `start` in the open mailbox, ascending.
    fn search_from(&mut self, start: Uid) -> impl Future<Output = Result<Vec<Uid>>> + Send;

    /// UID, flags, envelope and size (and body when asked) for `set`.
    fn fetch_messages(
        &mut self,
        set: &UidSet,
        with_body: bool,
    ) -> impl Future<Output = Result<Vec<FetchedMessage>>> + Send;

    /// UID and flags only.
    fn fetch_flags(
        &mut self,
        set: &UidSet,
    ) -> impl Future<Output = Result<Vec<FetchedMessage>>> + Send;

    /// Raw message bytes, `None` if the UID is gone.
    fn fetch_body(&mut self, uid: Uid) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// UID STORE, returning the resulting flag sets.
    fn store_flags(
        &mut self,
        set: &UidSet,
        action: StoreAction,
        flags: &Flags,
    ) -> impl Future<Output = Result<Vec<FetchedMessage>>> + Send;

    /// UID MOVE to `target`.
    fn move_messages(
        &mut self,
        set: &UidSet,
        target: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// EXPUNGE the open mailbox, returning how many messages were removed.
    fn expunge(&mut self) -> impl Future<Output = Result<usize>> + Send;

    /// CREATE a mailbox.
    fn create_mailbox(&mut self, path: &str) -> impl Future<Output = Result<()>> + Send;

    /// RENAME a mailbox.
    fn rename_mailbox(
        &mut self,
        from: &str,
        to: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// DELETE a mailbox.
    fn delete_mailbox(&mut self, path: &str) -> impl Future<Output = Result<()>> + Send;

    /// NOOP.
    fn noop(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// LOGOUT, consuming the session.
    fn logout(self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens authenticated sessions for an account.
pub trait Connector: Send + Sync + 'static {
    /// Session type produced.
    type Session: RemoteSession;

    /// Connects and authenticates once, without retrying.
    fn connect(
        &self,
        account: &AccountConfig,
        settings: &SyncSettings,
    ) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// Connector backed by real IMAP connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapConnector;

impl Connector for ImapConnector {
    type Session = sagebox_imap::Session;

    async fn connect(
        &self,
        account: &AccountConfig,
        settings: &SyncSettings,
    ) -> Result<Self::Session> {
        let config = account.imap_config(settings);
        Ok(sagebox_imap::Session::connect(&config).await?)
    }
}

impl RemoteSession for sagebox_imap::Session {
    async fn list_mailboxes(&mut self) -> Result<Vec<MailboxInfo>> {
        Ok(Self::list_mailboxes(self).await?)
    }

    async fn status(&mut self, path: &str) -> Result<MailboxStatus> {
        Ok(Self::status(self, path).await?)
    }

    async fn examine(&mut self, path: &str) -> Result<MailboxStatus> {
        Ok(Self::examine(self, path).await?)
    }

    async fn select(&mut self, path: &str) -> Result<MailboxStatus> {
        Ok(Self::select(self, path).await?)
    }

    async fn search_from(&mut self, start: Uid) -> Result<Vec<Uid>> {
        Ok(Self::search_from(self, start).await?)
    }

    async fn fetch_messages(
        &mut self,
        set: &UidSet,
        with_body: bool,
    ) -> Result<Vec<FetchedMessage>> {
        Ok(Self::fetch_messages(self, set, with_body).await?)
    }

    async fn fetch_flags(&mut self, set: &UidSet) -> Result<Vec<FetchedMessage>> {
        Ok(Self::fetch_flags(self, set).await?)
    }

    async fn fetch_body(&mut self, uid: Uid) -> Result<Option<Vec<u8>>> {
        Ok(Self::fetch_body(self, uid).await?)
    }

    async fn store_flags(
        &mut self,
        set: &UidSet,
        action: StoreAction,
        flags: &Flags,
    ) -> Result<Vec<FetchedMessage>> {
        Ok(Self::store_flags(self, set, action, flags).await?)
    }

    async fn move_messages(&mut self, set: &UidSet, target: &str) -> Result<()> {
        Ok(Self::move_messages(self, set, target).await?)
    }

    async fn expunge(&mut self) -> Result<usize> {
        Ok(Self::expunge(self).await?)
    }

    async fn create_mailbox(&mut self, path: &str) -> Result<()> {
        Ok(Self::create_mailbox(self, path).await?)
    }

    async fn rename_mailbox(&mut self, from: &str, to: &str) -> Result<()> {
        Ok(Self::rename_mailbox(self, from, to).await?)
    }

    async fn delete_mailbox(&mut self, path: &str) -> Result<()> {
        Ok(Self::delete_mailbox(self, path).await?)
    }

    async fn noop(&mut self) -> Result<()> {
        Ok(Self::noop(self).await?)
    }

    async fn logout(self) -> Result<()> {
        Ok(Self::logout(self).await?)
    }
}
