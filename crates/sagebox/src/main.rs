//! `sagebox` - keeps a local index of IMAP mailboxes in sync.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sagebox_core::AccountId;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "SAGEBOX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synchronize one or every configured account
    Sync {
        /// Only this account
        #[arg(short, long)]
        account: Option<String>,
        /// Only this mailbox
        #[arg(short, long, requires = "account")]
        mailbox: Option<String>,
        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log in and out to verify account settings
    Check {
        /// Only this account
        #[arg(short, long)]
        account: Option<String>,
    },
    /// List the indexed mailboxes of an account
    Mailboxes { account: String },
    /// Write the raw message to stdout, fetching it if needed
    Body {
        account: String,
        mailbox: String,
        uid: u32,
    },
    /// Move messages from the trash back to the inbox
    Restore {
        account: String,
        #[arg(required = true)]
        uids: Vec<u32>,
    },
    /// Permanently delete everything in the trash
    ClearTrash { account: String },
    /// Create, rename or delete a mailbox on the server
    Folder {
        account: String,
        #[command(subcommand)]
        action: FolderAction,
    },
}

#[derive(Subcommand, Debug)]
enum FolderAction {
    /// Create a mailbox
    Create { name: String },
    /// Rename a user mailbox
    Rename { from: String, to: String },
    /// Delete a mailbox and its index entries
    Delete { path: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sagebox=info,sagebox_core=info,sagebox_imap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load(&path).await?;
    let service = commands::build_service(&config).await?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, finishing current batches");
                cancel.cancel();
            }
        }
    });

    let result = match &cli.command {
        Command::Sync {
            account,
            mailbox,
            json,
        } => {
            let accounts = config.select_accounts(account.as_deref())?;
            commands::sync(&service, &accounts, mailbox.as_deref(), *json, &cancel).await
        }
        Command::Check { account } => {
            let accounts = config.select_accounts(account.as_deref())?;
            commands::check(&service, &accounts).await
        }
        Command::Mailboxes { account } => {
            commands::mailboxes(&service, &AccountId::new(account.as_str())).await
        }
        Command::Body {
            account,
            mailbox,
            uid,
        } => commands::body(&service, &AccountId::new(account.as_str()), mailbox, *uid).await,
        Command::Restore { account, uids } => {
            commands::restore(&service, &AccountId::new(account.as_str()), uids).await
        }
        Command::ClearTrash { account } => {
            commands::clear_trash(&service, &AccountId::new(account.as_str())).await
        }
        Command::Folder { account, action } => {
            let id = AccountId::new(account.as_str());
            match action {
                FolderAction::Create { name } => service.create_mailbox(&id, name).await,
                FolderAction::Rename { from, to } => service.rename_mailbox(&id, from, to).await,
                FolderAction::Delete { path } => service.delete_mailbox(&id, path).await,
            }
            .map_err(Into::into)
        }
    };

    service.shutdown().await;
    result
}
