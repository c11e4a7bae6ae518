//! # sagebox-core
//!
//! IMAP synchronization and message-indexing engine.
//!
//! This crate provides:
//! - Account configuration and validation
//! - A per-account connection pool with retry and backoff
//! - Folder enumeration, batched fetching and flag reconciliation
//! - The [`IndexStore`] persistence seam, with `SQLite` and in-memory stores
//! - [`SyncService`], the entry point for syncs and message actions
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sagebox_core::{
//!     AccountConfig, AccountId, Credential, ImapConnector, MemoryStore, SyncService,
//!     SyncSettings,
//! };
//!
//! # async fn run() -> sagebox_core::Result<()> {
//! let mut service = SyncService::new(ImapConnector, SyncSettings::default());
//! let account = AccountConfig::new(
//!     "work",
//!     "imap.example.com",
//!     "alice@example.com",
//!     Credential::Password { password: "secret".into() },
//! );
//! service.add_account(account, Arc::new(MemoryStore::new()))?;
//!
//! let report = service.sync_account(&AccountId::new("work")).await?;
//! println!("{} mailboxes synced", report.mailboxes.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
mod error;
pub mod index;
pub mod pool;
pub mod remote;
pub mod service;
pub mod sync;

pub use account::{
    AccountConfig, AccountId, Credential, Security, SyncSettings, ValidationError,
    ValidationResult, validate_account, validate_folder_name,
};
pub use error::{Error, Result, StoreError};
pub use index::{
    BodyState, FolderKind, IndexStore, Mailbox, MemoryStore, MessageRecord, ReconciliationPlan,
    SqliteStore, SyncCursor,
};
pub use pool::{ConnectionPool, PooledSession};
pub use remote::{Connector, ImapConnector, RemoteSession};
pub use service::{FlagChange, SyncService};
pub use sync::{MailboxOutcome, MailboxReport, SyncPhase, SyncReport};
