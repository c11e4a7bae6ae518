//! # sagebox-imap
//!
//! The IMAP session layer used by the sagebox sync engine.
//!
//! The wire protocol itself is handled by [`async_imap`]; this crate owns
//! everything around it that the engine depends on:
//!
//! - **Connection setup**: TCP + TLS via rustls with the webpki root store,
//!   bounded by connect and I/O timeouts
//! - **Authentication**: LOGIN for passwords, SASL `XOAUTH2` for tokens
//! - **Typed results**: UIDs, UID validity, flag sets and decoded envelopes
//!   instead of raw protocol structures
//! - **Error classification**: every failure is tagged as authentication,
//!   transport or protocol so callers can decide what to retry
//!
//! ## Quick Start
//!
//! ```ignore
//! use sagebox_imap::{Config, Credentials, Session, UidSet};
//!
//! #[tokio::main]
//! async fn main() -> sagebox_imap::Result<()> {
//!     let config = Config::builder("imap.example.com")
//!         .credentials(Credentials::password("user@example.com", "secret"))
//!         .build();
//!
//!     let mut session = Session::connect(&config).await?;
//!     for mailbox in session.list_mailboxes().await? {
//!         let status = session.examine(&mailbox.path).await?;
//!         println!("{}: {} messages", mailbox.path, status.exists);
//!     }
//!     session.logout().await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod error;
pub mod header;
mod session;
mod stream;
pub mod types;

pub use config::{Config, ConfigBuilder, Credentials, Security};
pub use error::{Error, Result};
pub use session::{Session, StoreAction};
pub use stream::{ImapStream, connect, create_tls_connector};
pub use types::{
    Envelope, FetchedMessage, Flag, Flags, MailboxInfo, MailboxStatus, SpecialUse, Uid, UidSet,
    UidValidity,
};
