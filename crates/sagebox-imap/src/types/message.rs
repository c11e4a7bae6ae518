//! Fetched message data.

use super::{Flags, Uid};

/// Decoded envelope fields.
///
/// Text fields have RFC 2047 encoded words already decoded. The date is
/// kept as the raw header value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Subject line.
    pub subject: Option<String>,
    /// Sender addresses, formatted as `Name <local@host>`.
    pub from: Vec<String>,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Carbon-copy addresses.
    pub cc: Vec<String>,
    /// Blind carbon-copy addresses. Servers usually report these only for
    /// the sender's own copies.
    pub bcc: Vec<String>,
    /// Raw `Date:` header.
    pub date: Option<String>,
    /// `Message-ID:` header.
    pub message_id: Option<String>,
}

/// One message from a UID FETCH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Message UID.
    pub uid: Uid,
    /// Current flags.
    pub flags: Flags,
    /// `RFC822.SIZE`, when requested.
    pub size: Option<u32>,
    /// Envelope, when requested.
    pub envelope: Option<Envelope>,
    /// Raw RFC 5322 message, when requested.
    pub body: Option<Vec<u8>>,
}

impl FetchedMessage {
    /// Creates a message carrying only a UID and flags.
    #[must_use]
    pub const fn flags_only(uid: Uid, flags: Flags) -> Self {
        Self {
            uid,
            flags,
            size: None,
            envelope: None,
            body: None,
        }
    }
}
