//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use sagebox_core::{
    AccountId, ImapConnector, MailboxOutcome, SqliteStore, SyncReport, SyncService,
};
use sagebox_imap::Uid;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

pub type Service = SyncService<ImapConnector, SqliteStore>;

/// Opens one database per account and registers it.
pub async fn build_service(config: &Config) -> Result<Service> {
    let mut service = SyncService::new(ImapConnector, config.sync_settings());
    for account in &config.accounts {
        let path = config.database_path(&account.id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let location = path
            .to_str()
            .with_context(|| format!("database path is not UTF-8: {}", path.display()))?;
        let store = SqliteStore::new(location)
            .await
            .with_context(|| format!("opening {location}"))?;
        service
            .add_account(account.clone(), Arc::new(store))
            .with_context(|| format!("account {}", account.id))?;
    }
    Ok(service)
}

pub async fn sync(
    service: &Service,
    accounts: &[AccountId],
    mailbox: Option<&str>,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut failed = 0usize;
    for id in accounts {
        if cancel.is_cancelled() {
            break;
        }
        if let Some(path) = mailbox {
            let report = service.sync_mailbox(id, path, cancel).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{id}/{}: +{} ~{} -{}{}",
                    report.path,
                    report.inserted,
                    report.updated,
                    report.deleted,
                    if report.full_resync { " (full resync)" } else { "" }
                );
            }
            continue;
        }

        match service.sync_account_with_cancel(id, cancel).await {
            Ok(report) => {
                if !report.is_success() {
                    failed += 1;
                }
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print_report(&report);
                }
            }
            Err(err) => {
                tracing::error!(account = %id, error = %err, "sync failed");
                eprintln!("{id}: {err}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} account(s) did not sync cleanly");
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    let (inserted, updated, deleted) = report.totals();
    let elapsed = report.finished_at - report.started_at;
    println!(
        "{}: +{inserted} ~{updated} -{deleted} in {}.{:03}s",
        report.account_id,
        elapsed.num_seconds(),
        elapsed.num_milliseconds() % 1000
    );
    for mailbox in &report.mailboxes {
        let status = match &mailbox.outcome {
            MailboxOutcome::Completed if mailbox.is_unchanged() => continue,
            MailboxOutcome::Completed => String::new(),
            MailboxOutcome::Failed(err) => format!(" failed: {err}"),
            MailboxOutcome::Skipped => " skipped (busy)".to_string(),
            MailboxOutcome::Cancelled => " cancelled".to_string(),
        };
        println!(
            "  {}: +{} ~{} -{}{}{status}",
            mailbox.path,
            mailbox.inserted,
            mailbox.updated,
            mailbox.deleted,
            if mailbox.full_resync { " (full resync)" } else { "" }
        );
    }
    for path in &report.removed_mailboxes {
        println!("  {path}: removed");
    }
}

pub async fn check(service: &Service, accounts: &[AccountId]) -> Result<()> {
    let mut failed = 0usize;
    for id in accounts {
        match service.check_connection(id).await {
            Ok(()) => println!("{id}: ok"),
            Err(err) => {
                println!("{id}: {err}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} account(s) failed the connection check");
    }
    Ok(())
}

pub async fn mailboxes(service: &Service, id: &AccountId) -> Result<()> {
    let mailboxes = service.mailboxes(id).await?;
    if mailboxes.is_empty() {
        println!("{id}: nothing indexed yet, run `sagebox sync` first");
        return Ok(());
    }
    for mailbox in mailboxes {
        let highest = mailbox
            .highest_uid
            .map_or_else(|| "-".to_string(), |uid| uid.to_string());
        println!(
            "{:<32} {:<8} {:>7} messages  highest UID {highest}",
            mailbox.path,
            mailbox.kind.as_str(),
            mailbox.message_count
        );
    }
    Ok(())
}

pub async fn restore(service: &Service, id: &AccountId, uids: &[u32]) -> Result<()> {
    let uids = uids
        .iter()
        .map(|n| Uid::new(*n).context("UID must be non-zero"))
        .collect::<Result<Vec<_>>>()?;
    let restored = service.restore_from_trash(id, &uids).await?;
    println!("{id}: {restored} message(s) restored to the inbox");
    Ok(())
}

pub async fn clear_trash(service: &Service, id: &AccountId) -> Result<()> {
    let removed = service.clear_trash(id).await?;
    println!("{id}: {removed} message(s) permanently deleted");
    Ok(())
}

pub async fn body(service: &Service, id: &AccountId, mailbox: &str, uid: u32) -> Result<()> {
    let uid = Uid::new(uid).context("UID must be non-zero")?;
    let body = service.fetch_body(id, mailbox, uid).await?;
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&body).await?;
    stdout.flush().await?;
    Ok(())
}
