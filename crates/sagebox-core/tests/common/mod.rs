//! In-process IMAP backend for integration tests.
//!
//! `FakeServer` implements `Connector`; every session shares the same
//! mailbox state so tests can change the server between syncs and inspect
//! which commands were issued.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use sagebox_core::index::{
    Mailbox, MailboxEntry, MessageRecord, ReconciliationPlan, StoreResult, SyncCursor,
};
use sagebox_core::{
    AccountConfig, Connector, Credential, Error, IndexStore, MemoryStore, RemoteSession, Result,
    StoreError, SyncSettings,
};
use sagebox_imap::{
    Envelope, FetchedMessage, Flag, Flags, MailboxInfo, MailboxStatus, SpecialUse, StoreAction,
    Uid, UidSet, UidValidity,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub const ACCOUNT: &str = "work";

pub fn uid(n: u32) -> Uid {
    Uid::new(n).unwrap()
}

pub fn account() -> AccountConfig {
    AccountConfig::new(
        ACCOUNT,
        "imap.example.com",
        "alice@example.com",
        Credential::Password {
            password: "secret".into(),
        },
    )
}

pub fn seen() -> Flags {
    [Flag::Seen].into_iter().collect()
}

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub flags: Flags,
    pub subject: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FakeMailbox {
    pub uid_validity: u32,
    pub next_uid: u32,
    pub selectable: bool,
    pub special_use: Option<SpecialUse>,
    pub messages: BTreeMap<u32, FakeMessage>,
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub mailboxes: BTreeMap<String, FakeMailbox>,
    /// `"<mailbox> <uid set>"` for every envelope fetch.
    pub envelope_log: Vec<String>,
    /// `"<mailbox> <uid set>"` for every flag fetch.
    pub flag_log: Vec<String>,
    pub body_fetches: usize,
    pub connects: u32,
    pub connect_failures: u32,
    pub reject_auth: bool,
    /// Envelope fetches allowed before every further one fails.
    pub fail_fetch_after: Option<usize>,
    /// Token cancelled once this many envelope fetches have succeeded.
    pub cancel_after: Option<(usize, CancellationToken)>,
    /// Examine blocks on this semaphore when set.
    pub examine_gate: Option<Arc<Semaphore>>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn add_mailbox(&self, path: &str, uid_validity: u32) {
        self.state().mailboxes.insert(
            path.to_string(),
            FakeMailbox {
                uid_validity,
                next_uid: 1,
                selectable: true,
                special_use: None,
                messages: BTreeMap::new(),
            },
        );
    }

    pub fn add_special(&self, path: &str, uid_validity: u32, special_use: SpecialUse) {
        self.add_mailbox(path, uid_validity);
        self.mailbox(path, |mailbox| mailbox.special_use = Some(special_use));
    }

    pub fn add_noselect(&self, path: &str) {
        self.add_mailbox(path, 1);
        self.mailbox(path, |mailbox| mailbox.selectable = false);
    }

    pub fn remove_mailbox(&self, path: &str) {
        self.state().mailboxes.remove(path);
    }

    fn mailbox<T>(&self, path: &str, f: impl FnOnce(&mut FakeMailbox) -> T) -> T {
        let mut state = self.state();
        f(state.mailboxes.get_mut(path).unwrap())
    }

    /// Appends a message and returns its UID.
    pub fn append(&self, path: &str, subject: &str) -> u32 {
        self.mailbox(path, |mailbox| {
            let uid = mailbox.next_uid;
            mailbox.next_uid += 1;
            mailbox.messages.insert(
                uid,
                FakeMessage {
                    flags: Flags::new(),
                    subject: subject.to_string(),
                    body: format!("Subject: {subject}\r\n\r\nbody of {uid}\r\n").into_bytes(),
                },
            );
            uid
        })
    }

    pub fn append_many(&self, path: &str, count: u32) -> Vec<u32> {
        (1..=count)
            .map(|n| self.append(path, &format!("message {n}")))
            .collect()
    }

    pub fn set_flags(&self, path: &str, uid: u32, flags: Flags) {
        self.mailbox(path, |mailbox| {
            mailbox.messages.get_mut(&uid).unwrap().flags = flags;
        });
    }

    pub fn expunge(&self, path: &str, uid: u32) {
        self.mailbox(path, |mailbox| {
            mailbox.messages.remove(&uid);
        });
    }

    /// Changes the UID validity and renumbers every message from 1.
    pub fn renumber(&self, path: &str, uid_validity: u32) {
        self.mailbox(path, |mailbox| {
            let messages: Vec<FakeMessage> =
                std::mem::take(&mut mailbox.messages).into_values().collect();
            mailbox.uid_validity = uid_validity;
            mailbox.next_uid = 1;
            for message in messages {
                mailbox.messages.insert(mailbox.next_uid, message);
                mailbox.next_uid += 1;
            }
        });
    }

    pub fn uids(&self, path: &str) -> Vec<u32> {
        self.mailbox(path, |mailbox| mailbox.messages.keys().copied().collect())
    }

    pub fn flags(&self, path: &str, uid: u32) -> Flags {
        self.mailbox(path, |mailbox| mailbox.messages[&uid].flags.clone())
    }

    pub fn has_mailbox(&self, path: &str) -> bool {
        self.state().mailboxes.contains_key(path)
    }

    pub fn subject(&self, path: &str, uid: u32) -> String {
        self.mailbox(path, |mailbox| mailbox.messages[&uid].subject.clone())
    }

    pub fn envelope_log(&self) -> Vec<String> {
        self.state().envelope_log.clone()
    }

    pub fn flag_log(&self) -> Vec<String> {
        self.state().flag_log.clone()
    }

    pub fn clear_logs(&self) {
        let mut state = self.state();
        state.envelope_log.clear();
        state.flag_log.clear();
    }

    pub fn connects(&self) -> u32 {
        self.state().connects
    }

    pub fn body_fetches(&self) -> usize {
        self.state().body_fetches
    }

    pub fn fail_fetches_after(&self, successes: Option<usize>) {
        let mut state = self.state();
        let done = state.envelope_log.len();
        state.fail_fetch_after = successes.map(|n| n + done);
    }

    pub fn cancel_after(&self, fetches: usize, token: CancellationToken) {
        self.state().cancel_after = Some((fetches, token));
    }

    pub fn fail_connects(&self, count: u32) {
        self.state().connect_failures = count;
    }

    pub fn reject_auth(&self) {
        self.state().reject_auth = true;
    }

    /// Makes every EXAMINE wait for a permit on the returned semaphore.
    pub fn gate_examine(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.state().examine_gate = Some(Arc::clone(&gate));
        gate
    }
}

impl Connector for FakeServer {
    type Session = FakeSession;

    async fn connect(&self, _: &AccountConfig, _: &SyncSettings) -> Result<FakeSession> {
        let mut state = self.state();
        state.connects += 1;
        if state.reject_auth {
            return Err(Error::Auth("[AUTHENTICATIONFAILED] invalid credentials".into()));
        }
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(Error::Network("connection refused".into()));
        }
        Ok(FakeSession {
            server: self.clone(),
            selected: None,
        })
    }
}

#[derive(Debug)]
pub struct FakeSession {
    server: FakeServer,
    selected: Option<String>,
}

impl FakeSession {
    fn selected(&self) -> Result<String> {
        self.selected
            .clone()
            .ok_or_else(|| Error::Protocol("no mailbox selected".into()))
    }

    fn open(&mut self, path: &str) -> Result<MailboxStatus> {
        let state = self.server.state();
        let mailbox = state
            .mailboxes
            .get(path)
            .ok_or_else(|| Error::Protocol(format!("NO no such mailbox {path}")))?;
        self.selected = Some(path.to_string());
        Ok(status_of(mailbox))
    }

    fn matching(&self, set: &UidSet) -> Result<Vec<(u32, FakeMessage)>> {
        let path = self.selected()?;
        let state = self.server.state();
        Ok(state.mailboxes[&path]
            .messages
            .iter()
            .filter(|(n, _)| set.contains(uid(**n)))
            .map(|(n, message)| (*n, message.clone()))
            .collect())
    }
}

fn status_of(mailbox: &FakeMailbox) -> MailboxStatus {
    MailboxStatus {
        exists: u32::try_from(mailbox.messages.len()).unwrap(),
        uid_next: Uid::new(mailbox.next_uid),
        uid_validity: UidValidity::new(mailbox.uid_validity),
    }
}

fn envelope_of(n: u32, message: &FakeMessage) -> Envelope {
    Envelope {
        subject: Some(message.subject.clone()),
        from: vec!["Bob <bob@example.com>".into()],
        to: vec!["alice@example.com".into()],
        cc: vec![format!("list-{n}@example.com")],
        bcc: Vec::new(),
        date: Some("Tue, 2 Jan 2024 10:00:00 +0000".into()),
        message_id: Some(format!("<{n}@example.com>")),
    }
}

impl RemoteSession for FakeSession {
    async fn list_mailboxes(&mut self) -> Result<Vec<MailboxInfo>> {
        let state = self.server.state();
        Ok(state
            .mailboxes
            .iter()
            .map(|(path, mailbox)| MailboxInfo {
                path: path.clone(),
                delimiter: Some("/".into()),
                selectable: mailbox.selectable,
                special_use: mailbox.special_use,
            })
            .collect())
    }

    async fn status(&mut self, path: &str) -> Result<MailboxStatus> {
        let state = self.server.state();
        state
            .mailboxes
            .get(path)
            .map(status_of)
            .ok_or_else(|| Error::Protocol(format!("NO no such mailbox {path}")))
    }

    async fn examine(&mut self, path: &str) -> Result<MailboxStatus> {
        let gate = self.server.state().examine_gate.clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        self.open(path)
    }

    async fn select(&mut self, path: &str) -> Result<MailboxStatus> {
        self.open(path)
    }

    async fn search_from(&mut self, start: Uid) -> Result<Vec<Uid>> {
        let path = self.selected()?;
        let state = self.server.state();
        Ok(state.mailboxes[&path]
            .messages
            .keys()
            .filter(|n| **n >= start.get())
            .map(|n| uid(*n))
            .collect())
    }

    async fn fetch_messages(&mut self, set: &UidSet, with_body: bool) -> Result<Vec<FetchedMessage>> {
        let path = self.selected()?;
        {
            let mut state = self.server.state();
            let done = state.envelope_log.len();
            if state.fail_fetch_after.is_some_and(|limit| done >= limit) {
                return Err(Error::Network("connection reset by peer".into()));
            }
            state.envelope_log.push(format!("{path} {set}"));
            if let Some((after, token)) = &state.cancel_after
                && state.envelope_log.len() >= *after
            {
                token.cancel();
            }
        }

        Ok(self
            .matching(set)?
            .into_iter()
            .map(|(n, message)| FetchedMessage {
                uid: uid(n),
                flags: message.flags.clone(),
                size: u32::try_from(message.body.len()).ok(),
                envelope: Some(envelope_of(n, &message)),
                body: with_body.then(|| message.body.clone()),
            })
            .collect())
    }

    async fn fetch_flags(&mut self, set: &UidSet) -> Result<Vec<FetchedMessage>> {
        let path = self.selected()?;
        self.server.state().flag_log.push(format!("{path} {set}"));
        Ok(self
            .matching(set)?
            .into_iter()
            .map(|(n, message)| FetchedMessage::flags_only(uid(n), message.flags))
            .collect())
    }

    async fn fetch_body(&mut self, target: Uid) -> Result<Option<Vec<u8>>> {
        let path = self.selected()?;
        let mut state = self.server.state();
        state.body_fetches += 1;
        Ok(state.mailboxes[&path]
            .messages
            .get(&target.get())
            .map(|message| message.body.clone()))
    }

    async fn store_flags(
        &mut self,
        set: &UidSet,
        action: StoreAction,
        flags: &Flags,
    ) -> Result<Vec<FetchedMessage>> {
        let path = self.selected()?;
        let mut state = self.server.state();
        let mailbox = state.mailboxes.get_mut(&path).unwrap();
        let mut out = Vec::new();
        for (n, message) in &mut mailbox.messages {
            if !set.contains(uid(*n)) {
                continue;
            }
            match action {
                StoreAction::Add => flags.iter().for_each(|f| message.flags.insert(f.clone())),
                StoreAction::Remove => flags.iter().for_each(|f| message.flags.remove(f)),
            }
            out.push(FetchedMessage::flags_only(uid(*n), message.flags.clone()));
        }
        Ok(out)
    }

    async fn move_messages(&mut self, set: &UidSet, target: &str) -> Result<()> {
        let path = self.selected()?;
        let mut state = self.server.state();
        if !state.mailboxes.contains_key(target) {
            return Err(Error::Protocol(format!("NO [TRYCREATE] {target}")));
        }
        let source = state.mailboxes.get_mut(&path).unwrap();
        let moving: Vec<u32> = source
            .messages
            .keys()
            .copied()
            .filter(|n| set.contains(uid(*n)))
            .collect();
        let moved: Vec<FakeMessage> = moving
            .iter()
            .filter_map(|n| source.messages.remove(n))
            .collect();

        let destination = state.mailboxes.get_mut(target).unwrap();
        for message in moved {
            destination.messages.insert(destination.next_uid, message);
            destination.next_uid += 1;
        }
        Ok(())
    }

    async fn expunge(&mut self) -> Result<usize> {
        let path = self.selected()?;
        let mut state = self.server.state();
        let mailbox = state.mailboxes.get_mut(&path).unwrap();
        let before = mailbox.messages.len();
        mailbox
            .messages
            .retain(|_, message| !message.flags.contains(&Flag::Deleted));
        Ok(before - mailbox.messages.len())
    }

    async fn create_mailbox(&mut self, path: &str) -> Result<()> {
        if self.server.state().mailboxes.contains_key(path) {
            return Err(Error::Protocol(format!("NO [ALREADYEXISTS] {path}")));
        }
        self.server.add_mailbox(path, 1);
        Ok(())
    }

    async fn rename_mailbox(&mut self, from: &str, to: &str) -> Result<()> {
        let mut state = self.server.state();
        if state.mailboxes.contains_key(to) {
            return Err(Error::Protocol(format!("NO [ALREADYEXISTS] {to}")));
        }
        let mailbox = state
            .mailboxes
            .remove(from)
            .ok_or_else(|| Error::Protocol(format!("NO [NONEXISTENT] {from}")))?;
        state.mailboxes.insert(to.to_string(), mailbox);
        Ok(())
    }

    async fn delete_mailbox(&mut self, path: &str) -> Result<()> {
        self.server
            .state()
            .mailboxes
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::Protocol(format!("NO [NONEXISTENT] {path}")))
    }

    async fn noop(&mut self) -> Result<()> {
        Ok(())
    }

    async fn logout(self) -> Result<()> {
        Ok(())
    }
}

/// A memory store whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }
}

impl IndexStore for FlakyStore {
    async fn list_mailboxes(&self) -> StoreResult<Vec<Mailbox>> {
        self.inner.list_mailboxes().await
    }

    async fn upsert_mailbox(&self, entry: &MailboxEntry) -> StoreResult<()> {
        self.inner.upsert_mailbox(entry).await
    }

    async fn remove_mailbox(&self, path: &str) -> StoreResult<()> {
        self.inner.remove_mailbox(path).await
    }

    async fn get_cursor(&self, path: &str) -> StoreResult<Option<SyncCursor>> {
        self.inner.get_cursor(path).await
    }

    async fn apply_plan(&self, path: &str, plan: &ReconciliationPlan) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("disk full".into()));
        }
        self.inner.apply_plan(path, plan).await
    }

    async fn known_flags(
        &self,
        path: &str,
        upto: Uid,
        limit: Option<usize>,
    ) -> StoreResult<Vec<(Uid, Flags)>> {
        self.inner.known_flags(path, upto, limit).await
    }

    async fn get_message(&self, path: &str, uid: Uid) -> StoreResult<Option<MessageRecord>> {
        self.inner.get_message(path, uid).await
    }

    async fn store_body(&self, path: &str, uid: Uid, body: &[u8]) -> StoreResult<()> {
        self.inner.store_body(path, uid, body).await
    }
}
