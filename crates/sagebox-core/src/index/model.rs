//! Index data model.

use std::fmt;

use chrono::{DateTime, Utc};
use sagebox_imap::{FetchedMessage, Flags, MailboxInfo, SpecialUse, Uid, UidValidity};
use serde::{Deserialize, Serialize};

/// Standard role of a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderKind {
    /// The inbox.
    Inbox,
    /// Sent messages.
    Sent,
    /// Drafts.
    Drafts,
    /// Junk or spam.
    Spam,
    /// Deleted messages.
    Trash,
    /// Archived messages.
    Archive,
    /// Anything else.
    #[default]
    Custom,
}

impl FolderKind {
    /// Well-known names matched before keyword patterns.
    const EXACT: [(&'static str, Self); 8] = [
        ("inbox", Self::Inbox),
        ("sent items", Self::Sent),
        ("sent", Self::Sent),
        ("drafts", Self::Drafts),
        ("junk", Self::Spam),
        ("spam", Self::Spam),
        ("trash", Self::Trash),
        ("deleted items", Self::Trash),
    ];

    /// Keyword patterns, checked in order.
    const KEYWORDS: [(&'static str, Self); 8] = [
        ("inbox", Self::Inbox),
        ("sent", Self::Sent),
        ("draft", Self::Drafts),
        ("junk", Self::Spam),
        ("spam", Self::Spam),
        ("trash", Self::Trash),
        ("deleted", Self::Trash),
        ("archive", Self::Archive),
    ];

    /// Derives the kind from a mailbox name.
    ///
    /// The name is lower-cased and stripped of surrounding quotes, matched
    /// against well-known names, then searched for keywords.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let normalized = name.to_lowercase();
        let normalized = normalized.trim_matches(|c: char| c == '"' || c == '\'');

        if let Some((_, kind)) = Self::EXACT.iter().find(|(exact, _)| *exact == normalized) {
            return *kind;
        }

        Self::KEYWORDS
            .iter()
            .find(|(keyword, _)| normalized.contains(*keyword))
            .map_or(Self::Custom, |(_, kind)| *kind)
    }

    /// Derives the kind from a LIST entry, preferring its special-use flag.
    #[must_use]
    pub fn from_mailbox(info: &MailboxInfo) -> Self {
        match info.special_use {
            Some(SpecialUse::Archive) => Self::Archive,
            Some(SpecialUse::Drafts) => Self::Drafts,
            Some(SpecialUse::Junk) => Self::Spam,
            Some(SpecialUse::Sent) => Self::Sent,
            Some(SpecialUse::Trash) => Self::Trash,
            None if info.path.eq_ignore_ascii_case("INBOX") => Self::Inbox,
            None => Self::from_name(info.leaf_name()),
        }
    }

    /// Stable storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
            Self::Spam => "spam",
            Self::Trash => "trash",
            Self::Archive => "archive",
            Self::Custom => "custom",
        }
    }

    /// Parses a storage name; unknown names map to `Custom`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "inbox" => Self::Inbox,
            "sent" => Self::Sent,
            "drafts" => Self::Drafts,
            "spam" => Self::Spam,
            "trash" => Self::Trash,
            "archive" => Self::Archive,
            _ => Self::Custom,
        }
    }
}

impl fmt::Display for FolderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-reported attributes of a mailbox, written by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxEntry {
    /// Full hierarchical path.
    pub path: String,
    /// Hierarchy delimiter.
    pub delimiter: Option<String>,
    /// Standard role.
    pub kind: FolderKind,
    /// Message count from STATUS or EXAMINE.
    pub message_count: u32,
}

/// A mailbox as recorded in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Full hierarchical path.
    pub path: String,
    /// Hierarchy delimiter.
    pub delimiter: Option<String>,
    /// Standard role.
    pub kind: FolderKind,
    /// Validity epoch of the stored UIDs; `None` before the first sync.
    pub uid_validity: Option<UidValidity>,
    /// Highest UID committed to the index.
    pub highest_uid: Option<Uid>,
    /// Message count last reported by the server.
    pub message_count: u32,
}

/// Per-mailbox progress marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    /// Epoch the indexed UIDs belong to.
    pub uid_validity: UidValidity,
    /// Highest UID committed; `None` when nothing is indexed yet.
    pub highest_uid: Option<Uid>,
    /// When every known UID last had its flags checked.
    pub last_full_reconciliation: Option<DateTime<Utc>>,
}

impl SyncCursor {
    /// A cursor for a new epoch with nothing indexed.
    #[must_use]
    pub const fn fresh(uid_validity: UidValidity) -> Self {
        Self {
            uid_validity,
            highest_uid: None,
            last_full_reconciliation: None,
        }
    }

    /// First UID not yet covered by the cursor.
    #[must_use]
    pub fn next_uid(&self) -> Option<Uid> {
        self.highest_uid.map_or(Some(Uid::MIN), Uid::next)
    }

    /// Returns true if `uid` is at or below the committed high-water mark.
    #[must_use]
    pub fn covers(&self, uid: Uid) -> bool {
        self.highest_uid.is_some_and(|highest| uid <= highest)
    }
}

/// How much of a message the index holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyState {
    /// Nothing beyond the UID.
    #[default]
    NotFetched,
    /// Envelope, flags and size.
    HeadersOnly,
    /// The raw message as well.
    Full,
}

impl BodyState {
    /// Stable storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFetched => "not_fetched",
            Self::HeadersOnly => "headers_only",
            Self::Full => "full",
        }
    }

    /// Parses a storage name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_fetched" => Some(Self::NotFetched),
            "headers_only" => Some(Self::HeadersOnly),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

/// One indexed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Owning mailbox path.
    pub mailbox: String,
    /// Message UID.
    pub uid: Uid,
    /// Current flags.
    pub flags: Flags,
    /// Decoded subject.
    pub subject: Option<String>,
    /// Sender addresses.
    pub from: Vec<String>,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Carbon-copy addresses.
    pub cc: Vec<String>,
    /// Blind carbon-copy addresses.
    pub bcc: Vec<String>,
    /// Raw `Date:` header.
    pub date_raw: Option<String>,
    /// Parsed date, when the header is valid RFC 2822.
    pub date: Option<DateTime<Utc>>,
    /// `Message-ID:` header.
    pub message_id: Option<String>,
    /// Size in bytes.
    pub size: Option<u32>,
    /// What the index holds for this message.
    pub body_state: BodyState,
    /// Raw message when `body_state` is `Full`.
    pub body: Option<Vec<u8>>,
}

impl MessageRecord {
    /// Builds a record from a fetch response.
    #[must_use]
    pub fn from_fetched(mailbox: &str, fetched: FetchedMessage) -> Self {
        let envelope = fetched.envelope.unwrap_or_default();
        let date = envelope.date.as_deref().and_then(parse_date);
        let body_state = if fetched.body.is_some() {
            BodyState::Full
        } else {
            BodyState::HeadersOnly
        };

        Self {
            mailbox: mailbox.to_string(),
            uid: fetched.uid,
            flags: fetched.flags,
            subject: envelope.subject,
            from: envelope.from,
            to: envelope.to,
            cc: envelope.cc,
            bcc: envelope.bcc,
            date_raw: envelope.date,
            date,
            message_id: envelope.message_id,
            size: fetched.size,
            body_state,
            body: fetched.body,
        }
    }
}

/// Parses an RFC 2822 date into UTC.
#[must_use]
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// A flag change for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagUpdate {
    /// Message UID.
    pub uid: Uid,
    /// New flag set.
    pub flags: Flags,
}

/// The mutations for one mailbox, applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Delete every record of the mailbox before anything else.
    pub purge: bool,
    /// Records to insert (idempotent per UID).
    pub inserts: Vec<MessageRecord>,
    /// Flag changes for known records.
    pub updates: Vec<FlagUpdate>,
    /// UIDs removed on the server.
    pub deletes: Vec<Uid>,
    /// Cursor to persist together with the mutations.
    pub cursor: Option<SyncCursor>,
}

impl ReconciliationPlan {
    /// Returns true if the plan changes no message records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.purge && self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Returns true if applying the plan would do nothing at all.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.is_empty() && self.cursor.is_none()
    }
}
