//! Authenticated IMAP session.
//!
//! [`Session`] wraps an [`async_imap::Session`] over an [`ImapStream`] and
//! exposes only the commands the sync engine issues, each bounded by the
//! configured I/O timeout and returning typed results.

use std::future::Future;
use std::time::Duration;

use async_imap::imap_proto::types::{Address, Envelope as RawEnvelope};
use async_imap::types::{Fetch, Flag as RawFlag, Mailbox, Name, NameAttribute};
use futures::TryStreamExt;

use crate::header::decode_bytes;
use crate::stream::{self, ImapStream};
use crate::types::{
    Envelope, FetchedMessage, Flag, Flags, MailboxInfo, MailboxStatus, SpecialUse, Uid, UidSet,
    UidValidity,
};
use crate::{Config, Credentials, Error, Result};

const ENVELOPE_QUERY: &str = "(UID FLAGS ENVELOPE RFC822.SIZE)";
const ENVELOPE_BODY_QUERY: &str = "(UID FLAGS ENVELOPE RFC822.SIZE BODY.PEEK[])";
const FLAGS_QUERY: &str = "(UID FLAGS)";
const BODY_QUERY: &str = "(UID BODY.PEEK[])";

/// How `UID STORE` changes the flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    /// `+FLAGS`: add the given flags.
    Add,
    /// `-FLAGS`: remove the given flags.
    Remove,
}

impl StoreAction {
    const fn item(self) -> &'static str {
        match self {
            Self::Add => "+FLAGS",
            Self::Remove => "-FLAGS",
        }
    }
}

struct XOAuth2 {
    user: String,
    token: String,
}

impl async_imap::Authenticator for XOAuth2 {
    type Response = String;

    fn process(&mut self, _challenge: &[u8]) -> Self::Response {
        format!("user={}\x01auth=Bearer {}\x01\x01", self.user, self.token)
    }
}

/// An authenticated IMAP session.
#[derive(Debug)]
pub struct Session {
    inner: async_imap::Session<ImapStream>,
    io_timeout: Duration,
}

impl Session {
    /// Connects and authenticates.
    ///
    /// Password credentials use LOGIN, token credentials use SASL `XOAUTH2`.
    /// A NO or BAD answer to the authentication command is reported as
    /// [`Error::Auth`].
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, TLS handshake or authentication
    /// fails, or if `config.connect_timeout` elapses first.
    pub async fn connect(config: &Config) -> Result<Self> {
        let transport = stream::connect(config).await?;
        let client = async_imap::Client::new(transport);

        let login = async move {
            match &config.credentials {
                Credentials::Password { username, password } => {
                    client.login(username, password).await.map_err(|(e, _)| e)
                }
                Credentials::OAuth2 { username, token } => {
                    let auth = XOAuth2 {
                        user: username.clone(),
                        token: token.clone(),
                    };
                    client.authenticate("XOAUTH2", auth).await.map_err(|(e, _)| e)
                }
            }
        };

        let inner = with_timeout(config.connect_timeout, async {
            login.await.map_err(login_error)
        })
        .await?;

        tracing::info!(
            host = %config.host,
            user = %config.credentials.username(),
            "IMAP session authenticated"
        );

        Ok(Self {
            inner,
            io_timeout: config.io_timeout,
        })
    }

    /// Lists every mailbox (`LIST "" "*"`).
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn list_mailboxes(&mut self) -> Result<Vec<MailboxInfo>> {
        let inner = &mut self.inner;
        let names: Vec<Name> = with_timeout(self.io_timeout, async {
            let stream = inner.list(Some(""), Some("*")).await?;
            Ok(stream.try_collect().await?)
        })
        .await?;

        Ok(names.iter().map(convert_name).collect())
    }

    /// Queries `STATUS (UIDVALIDITY UIDNEXT MESSAGES)` without selecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn status(&mut self, path: &str) -> Result<MailboxStatus> {
        let inner = &mut self.inner;
        let mailbox = with_timeout(self.io_timeout, async {
            Ok(inner.status(path, "(UIDVALIDITY UIDNEXT MESSAGES)").await?)
        })
        .await?;

        Ok(convert_mailbox(&mailbox))
    }

    /// Opens a mailbox read-only (EXAMINE).
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn examine(&mut self, path: &str) -> Result<MailboxStatus> {
        self.open(path, false).await
    }

    /// Opens a mailbox read-write (SELECT).
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn select(&mut self, path: &str) -> Result<MailboxStatus> {
        self.open(path, true).await
    }

    async fn open(&mut self, path: &str, writable: bool) -> Result<MailboxStatus> {
        let inner = &mut self.inner;
        let mailbox = with_timeout(self.io_timeout, async {
            if writable {
                Ok(inner.select(path).await?)
            } else {
                Ok(inner.examine(path).await?)
            }
        })
        .await?;

        tracing::debug!(mailbox = %path, writable, exists = mailbox.exists, "mailbox opened");
        Ok(convert_mailbox(&mailbox))
    }

    /// Returns the UIDs at or above `start` in the selected mailbox, sorted.
    ///
    /// `UID SEARCH n:*` always matches the highest message even when its UID
    /// is below `n`, so results below `start` are filtered out here.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn search_from(&mut self, start: Uid) -> Result<Vec<Uid>> {
        let query = format!("UID {}", UidSet::starting_at(start));
        let inner = &mut self.inner;
        let found = with_timeout(self.io_timeout, async {
            Ok(inner.uid_search(&query).await?)
        })
        .await?;

        let mut uids: Vec<Uid> = found
            .into_iter()
            .filter_map(Uid::new)
            .filter(|uid| *uid >= start)
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    /// Fetches UID, flags, envelope and size for `set`, plus the raw body
    /// when `with_body` is true.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn fetch_messages(
        &mut self,
        set: &UidSet,
        with_body: bool,
    ) -> Result<Vec<FetchedMessage>> {
        let query = if with_body {
            ENVELOPE_BODY_QUERY
        } else {
            ENVELOPE_QUERY
        };
        self.uid_fetch(set, query).await
    }

    /// Fetches only UID and flags for `set`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn fetch_flags(&mut self, set: &UidSet) -> Result<Vec<FetchedMessage>> {
        self.uid_fetch(set, FLAGS_QUERY).await
    }

    /// Fetches the raw RFC 5322 bytes of one message without setting `\Seen`.
    ///
    /// Returns `None` if the server no longer has the UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn fetch_body(&mut self, uid: Uid) -> Result<Option<Vec<u8>>> {
        let fetched = self.uid_fetch(&UidSet::single(uid), BODY_QUERY).await?;
        Ok(fetched
            .into_iter()
            .find(|message| message.uid == uid)
            .and_then(|message| message.body))
    }

    async fn uid_fetch(&mut self, set: &UidSet, query: &str) -> Result<Vec<FetchedMessage>> {
        let set = set.to_string();
        let inner = &mut self.inner;
        let fetches: Vec<Fetch> = with_timeout(self.io_timeout, async {
            let stream = inner.uid_fetch(&set, query).await?;
            Ok(stream.try_collect().await?)
        })
        .await?;

        tracing::trace!(set = %set, responses = fetches.len(), "UID FETCH complete");
        Ok(fetches.iter().filter_map(convert_fetch).collect())
    }

    /// Changes flags with `UID STORE` and returns the resulting flag sets.
    ///
    /// The mailbox must have been opened with [`Session::select`].
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn store_flags(
        &mut self,
        set: &UidSet,
        action: StoreAction,
        flags: &Flags,
    ) -> Result<Vec<FetchedMessage>> {
        let set = set.to_string();
        let query = format!("{} {}", action.item(), flags.to_list());
        let inner = &mut self.inner;
        let fetches: Vec<Fetch> = with_timeout(self.io_timeout, async {
            let stream = inner.uid_store(&set, &query).await?;
            Ok(stream.try_collect().await?)
        })
        .await?;

        Ok(fetches.iter().filter_map(convert_fetch).collect())
    }

    /// Moves messages to `target` with `UID MOVE`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn move_messages(&mut self, set: &UidSet, target: &str) -> Result<()> {
        let set = set.to_string();
        let inner = &mut self.inner;
        with_timeout(self.io_timeout, async {
            Ok(inner.uid_mv(&set, target).await?)
        })
        .await
    }

    /// Permanently removes `\Deleted` messages from the selected mailbox and
    /// returns how many were expunged.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn expunge(&mut self) -> Result<usize> {
        let inner = &mut self.inner;
        let removed: Vec<u32> = with_timeout(self.io_timeout, async {
            let stream = inner.expunge().await?;
            Ok(stream.try_collect().await?)
        })
        .await?;
        Ok(removed.len())
    }

    /// Creates a mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails, e.g. the mailbox exists.
    pub async fn create_mailbox(&mut self, path: &str) -> Result<()> {
        let inner = &mut self.inner;
        with_timeout(self.io_timeout, async { Ok(inner.create(path).await?) }).await
    }

    /// Renames a mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rename_mailbox(&mut self, from: &str, to: &str) -> Result<()> {
        let inner = &mut self.inner;
        with_timeout(self.io_timeout, async { Ok(inner.rename(from, to).await?) }).await
    }

    /// Deletes a mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails, e.g. the mailbox does not exist.
    pub async fn delete_mailbox(&mut self, path: &str) -> Result<()> {
        let inner = &mut self.inner;
        with_timeout(self.io_timeout, async { Ok(inner.delete(path).await?) }).await
    }

    /// Sends NOOP to check the connection is alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn noop(&mut self) -> Result<()> {
        let inner = &mut self.inner;
        with_timeout(self.io_timeout, async { Ok(inner.noop().await?) }).await
    }

    /// Logs out and closes the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn logout(mut self) -> Result<()> {
        let inner = &mut self.inner;
        with_timeout(self.io_timeout, async { Ok(inner.logout().await?) }).await
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::Timeout(timeout))?
}

fn login_error(err: async_imap::error::Error) -> Error {
    use async_imap::error::Error as ImapError;

    match err {
        ImapError::No(text) | ImapError::Bad(text) => Error::Auth(text),
        other => Error::from(other),
    }
}

fn convert_name(name: &Name) -> MailboxInfo {
    let mut info = MailboxInfo::new(name.name(), name.delimiter());
    for attribute in name.attributes() {
        match attribute {
            NameAttribute::NoSelect => info.selectable = false,
            NameAttribute::Archive => info.special_use = Some(SpecialUse::Archive),
            NameAttribute::Drafts => info.special_use = Some(SpecialUse::Drafts),
            NameAttribute::Junk => info.special_use = Some(SpecialUse::Junk),
            NameAttribute::Sent => info.special_use = Some(SpecialUse::Sent),
            NameAttribute::Trash => info.special_use = Some(SpecialUse::Trash),
            _ => {}
        }
    }
    info
}

fn convert_mailbox(mailbox: &Mailbox) -> MailboxStatus {
    MailboxStatus {
        exists: mailbox.exists,
        uid_next: mailbox.uid_next.and_then(Uid::new),
        uid_validity: mailbox.uid_validity.and_then(UidValidity::new),
    }
}

fn convert_flag(flag: &RawFlag<'_>) -> Option<Flag> {
    match flag {
        RawFlag::Seen => Some(Flag::Seen),
        RawFlag::Answered => Some(Flag::Answered),
        RawFlag::Flagged => Some(Flag::Flagged),
        RawFlag::Deleted => Some(Flag::Deleted),
        RawFlag::Draft => Some(Flag::Draft),
        RawFlag::Custom(name) => Flag::parse(name),
        _ => None,
    }
}

// Unsolicited FETCH responses carry no UID and are skipped.
fn convert_fetch(fetch: &Fetch) -> Option<FetchedMessage> {
    let Some(uid) = fetch.uid.and_then(Uid::new) else {
        tracing::trace!(seq = fetch.message, "ignoring FETCH response without UID");
        return None;
    };

    Some(FetchedMessage {
        uid,
        flags: fetch.flags().filter_map(|f| convert_flag(&f)).collect(),
        size: fetch.size,
        envelope: fetch.envelope().map(convert_envelope),
        body: fetch.body().map(<[u8]>::to_vec),
    })
}

fn convert_envelope(raw: &RawEnvelope<'_>) -> Envelope {
    Envelope {
        subject: raw.subject.as_deref().map(decode_bytes),
        from: raw.from.as_deref().map(format_addresses).unwrap_or_default(),
        to: raw.to.as_deref().map(format_addresses).unwrap_or_default(),
        cc: raw.cc.as_deref().map(format_addresses).unwrap_or_default(),
        bcc: raw.bcc.as_deref().map(format_addresses).unwrap_or_default(),
        date: raw.date.as_deref().map(decode_bytes),
        message_id: raw.message_id.as_deref().map(decode_bytes),
    }
}

fn format_addresses(addresses: &[Address<'_>]) -> Vec<String> {
    addresses
        .iter()
        .filter_map(|address| {
            let mailbox = address.mailbox.as_deref().map(decode_bytes)?;
            let email = match address.host.as_deref().map(decode_bytes) {
                Some(host) if !host.is_empty() => format!("{mailbox}@{host}"),
                _ => mailbox,
            };
            Some(match address.name.as_deref().map(decode_bytes) {
                Some(name) if !name.is_empty() => format!("{name} <{email}>"),
                _ => email,
            })
        })
        .collect()
}
