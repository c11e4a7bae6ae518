//! Error types for the sync engine.

use thiserror::Error;

use crate::account::{AccountId, ValidationError};

/// Errors raised by the index store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded.
    #[error("Corrupt index row: {0}")]
    Corrupt(String),

    /// The mailbox has no row in the index.
    #[error("Mailbox not indexed: {0}")]
    UnknownMailbox(String),
}

/// Errors that can occur during synchronization.
#[derive(Debug, Error)]
pub enum Error {
    /// The server rejected the account's credentials. Never retried.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport failure on an established session.
    #[error("Network error: {0}")]
    Network(String),

    /// No session could be opened after every retry.
    #[error("Connection unavailable after {attempts} attempts: {last_error}")]
    ConnectionUnavailable {
        /// Number of connection attempts made.
        attempts: u32,
        /// Message of the final failure.
        last_error: String,
    },

    /// The server sent a malformed or unexpected response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Index store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Another sync or action holds the mailbox.
    #[error("Mailbox busy: {0}")]
    MailboxBusy(String),

    /// The operation was cancelled.
    #[error("Sync cancelled")]
    Cancelled,

    /// No account with this id is registered.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Account configuration failed validation.
    #[error("Invalid configuration: {}", format_validation(.0))]
    InvalidConfig(Vec<ValidationError>),

    /// The mailbox does not exist on the server or in the index.
    #[error("Unknown mailbox: {0}")]
    UnknownMailbox(String),

    /// The server's UID validity no longer matches the index, so indexed
    /// UIDs may name other messages. A sync rebuilds the mailbox.
    #[error("UID validity of {mailbox} changed; sync the mailbox first")]
    UidValidityChanged {
        /// Mailbox path.
        mailbox: String,
    },

    /// A user-supplied mailbox name was rejected.
    #[error("Invalid mailbox name {name:?}: {reason}")]
    InvalidMailboxName {
        /// The rejected name.
        name: String,
        /// Rule the name breaks.
        reason: ValidationError,
    },

    /// A mailbox with this name already exists.
    #[error("Mailbox already exists: {0}")]
    MailboxExists(String),

    /// Standard mailboxes (inbox, sent, trash...) keep their names.
    #[error("Standard mailbox cannot be renamed: {0}")]
    ProtectedMailbox(String),

    /// The message does not exist on the server.
    #[error("Unknown message: UID {uid} in {mailbox}")]
    UnknownMessage {
        /// Mailbox path.
        mailbox: String,
        /// Message UID.
        uid: u32,
    },
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Returns true if the failure may clear up on a fresh connection.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::ConnectionUnavailable { .. })
    }

    /// Returns true if the session that produced this error can no longer be
    /// trusted and must not be reused.
    #[must_use]
    pub const fn poisons_session(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Protocol(_))
    }

    /// Returns true if this error aborts the whole account sync.
    #[must_use]
    pub const fn is_fatal_for_account(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<sagebox_imap::Error> for Error {
    fn from(err: sagebox_imap::Error) -> Self {
        if err.is_auth() {
            Self::Auth(err.to_string())
        } else if err.is_transient() {
            Self::Network(err.to_string())
        } else {
            Self::Protocol(err.to_string())
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::Database(err))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
