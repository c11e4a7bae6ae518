//! Folder enumeration.

use std::collections::HashSet;

use sagebox_imap::{MailboxInfo, MailboxStatus, Uid, UidValidity};

use crate::error::{Error, Result};
use crate::index::{FolderKind, IndexStore, MailboxEntry, SyncCursor};
use crate::remote::RemoteSession;

/// A selectable mailbox as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxDescriptor {
    /// Full hierarchical path.
    pub path: String,
    /// Hierarchy delimiter.
    pub delimiter: Option<String>,
    /// Standard role.
    pub kind: FolderKind,
    /// Current UID validity.
    pub uid_validity: UidValidity,
    /// Next UID the server will assign.
    pub uid_next: Option<Uid>,
    /// Number of messages.
    pub message_count: u32,
    /// The stored cursor belongs to an older UID validity.
    pub needs_full_resync: bool,
}

impl MailboxDescriptor {
    /// Builds a descriptor from LIST and STATUS data and the stored cursor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the path is empty or the server did not
    /// report a UID validity.
    pub fn new(
        info: &MailboxInfo,
        status: MailboxStatus,
        stored: Option<&SyncCursor>,
    ) -> Result<Self> {
        if info.path.is_empty() {
            return Err(Error::Protocol("LIST returned an empty mailbox name".into()));
        }
        let uid_validity = status.uid_validity.ok_or_else(|| {
            Error::Protocol(format!("no UIDVALIDITY reported for {}", info.path))
        })?;
        let needs_full_resync = stored.is_some_and(|cursor| cursor.uid_validity != uid_validity);

        Ok(Self {
            path: info.path.clone(),
            delimiter: info.delimiter.clone(),
            kind: FolderKind::from_mailbox(info),
            uid_validity,
            uid_next: status.uid_next,
            message_count: status.exists,
            needs_full_resync,
        })
    }

    /// The index row for this mailbox.
    #[must_use]
    pub fn entry(&self) -> MailboxEntry {
        MailboxEntry {
            path: self.path.clone(),
            delimiter: self.delimiter.clone(),
            kind: self.kind,
            message_count: self.message_count,
        }
    }
}

/// Result of enumerating an account's mailboxes.
#[derive(Debug, Default)]
pub struct MailboxListing {
    /// Mailboxes ready to sync.
    pub descriptors: Vec<MailboxDescriptor>,
    /// Mailboxes the server listed but that could not be described.
    pub failed: Vec<(String, Error)>,
}

impl MailboxListing {
    /// Paths of every mailbox the server listed as selectable.
    pub fn reported_paths(&self) -> impl Iterator<Item = &str> {
        self.descriptors
            .iter()
            .map(|d| d.path.as_str())
            .chain(self.failed.iter().map(|(path, _)| path.as_str()))
    }
}

/// Lists every selectable mailbox with its STATUS.
///
/// `\Noselect` entries are skipped. A mailbox whose STATUS fails or is
/// malformed lands in [`MailboxListing::failed`] and the rest are still
/// described.
///
/// # Errors
///
/// Returns an error if LIST fails, or if a per-mailbox failure means the
/// session is gone or the account was rejected.
pub async fn list_mailboxes<S, St>(session: &mut S, store: &St) -> Result<MailboxListing>
where
    S: RemoteSession,
    St: IndexStore,
{
    let listed = session.list_mailboxes().await?;
    let mut listing = MailboxListing::default();

    for info in listed.iter().filter(|info| info.selectable) {
        match describe(session, store, info).await {
            Ok(descriptor) => {
                if descriptor.needs_full_resync {
                    tracing::info!(mailbox = %descriptor.path, "UID validity changed");
                }
                listing.descriptors.push(descriptor);
            }
            Err(err) if err.is_transient() || err.is_fatal_for_account() => return Err(err),
            Err(err) => {
                tracing::warn!(mailbox = %info.path, error = %err, "mailbox status failed");
                listing.failed.push((info.path.clone(), err));
            }
        }
    }

    tracing::debug!(
        listed = listed.len(),
        selectable = listing.descriptors.len(),
        failed = listing.failed.len(),
        "mailboxes enumerated"
    );
    Ok(listing)
}

async fn describe<S, St>(
    session: &mut S,
    store: &St,
    info: &MailboxInfo,
) -> Result<MailboxDescriptor>
where
    S: RemoteSession,
    St: IndexStore,
{
    let status = session.status(&info.path).await?;
    let stored = store.get_cursor(&info.path).await?;
    MailboxDescriptor::new(info, status, stored.as_ref())
}

/// Brings the index's mailbox rows in line with the server.
///
/// Upserts every described mailbox and removes local mailboxes the server no
/// longer lists. Mailboxes that failed to describe are left untouched.
/// Returns the removed paths.
///
/// # Errors
///
/// Returns an error if a store operation fails.
pub async fn reconcile_mailbox_list<St: IndexStore>(
    store: &St,
    listing: &MailboxListing,
) -> Result<Vec<String>> {
    for descriptor in &listing.descriptors {
        store.upsert_mailbox(&descriptor.entry()).await?;
    }

    let reported: HashSet<&str> = listing.reported_paths().collect();
    let mut removed = Vec::new();
    for mailbox in store.list_mailboxes().await? {
        if !reported.contains(mailbox.path.as_str()) {
            tracing::info!(mailbox = %mailbox.path, "mailbox gone from server, removing");
            store.remove_mailbox(&mailbox.path).await?;
            removed.push(mailbox.path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::index::{MemoryStore, ReconciliationPlan};
    use sagebox_imap::SpecialUse;

    fn status(validity: u32, exists: u32) -> MailboxStatus {
        MailboxStatus {
            exists,
            uid_next: Uid::new(exists + 1),
            uid_validity: UidValidity::new(validity),
        }
    }

    mod descriptor_tests {
        use super::*;

        #[test]
        fn special_use_sets_kind() {
            let mut info = MailboxInfo::new("[Gmail]/Bin", Some("/"));
            info.special_use = Some(SpecialUse::Trash);
            let descriptor = MailboxDescriptor::new(&info, status(7, 3), None).unwrap();
            assert_eq!(descriptor.kind, FolderKind::Trash);
            assert_eq!(descriptor.message_count, 3);
            assert!(!descriptor.needs_full_resync);
        }

        #[test]
        fn validity_mismatch_needs_full_resync() {
            let info = MailboxInfo::new("INBOX", Some("/"));
            let stored = SyncCursor::fresh(UidValidity::new(1).unwrap());

            let same = MailboxDescriptor::new(&info, status(1, 0), Some(&stored)).unwrap();
            assert!(!same.needs_full_resync);

            let changed = MailboxDescriptor::new(&info, status(2, 0), Some(&stored)).unwrap();
            assert!(changed.needs_full_resync);
        }

        #[test]
        fn missing_validity_is_protocol_error() {
            let info = MailboxInfo::new("INBOX", Some("/"));
            let err = MailboxDescriptor::new(&info, MailboxStatus::default(), None).unwrap_err();
            assert!(matches!(err, Error::Protocol(_)));
        }

        #[test]
        fn empty_path_is_protocol_error() {
            let info = MailboxInfo::new("", Some("/"));
            let err = MailboxDescriptor::new(&info, status(1, 0), None).unwrap_err();
            assert!(matches!(err, Error::Protocol(_)));
        }
    }

    mod list_tests {
        use super::*;

        fn descriptor(path: &str) -> MailboxDescriptor {
            MailboxDescriptor::new(&MailboxInfo::new(path, Some("/")), status(1, 0), None).unwrap()
        }

        #[tokio::test]
        async fn removes_mailboxes_gone_from_server() {
            let store = MemoryStore::new();
            let old = descriptor("Old");
            store.upsert_mailbox(&old.entry()).await.unwrap();
            store
                .apply_plan(
                    "Old",
                    &ReconciliationPlan {
                        cursor: Some(SyncCursor::fresh(old.uid_validity)),
                        ..ReconciliationPlan::default()
                    },
                )
                .await
                .unwrap();

            let listing = MailboxListing {
                descriptors: vec![descriptor("INBOX"), descriptor("Sent")],
                failed: Vec::new(),
            };
            let removed = reconcile_mailbox_list(&store, &listing).await.unwrap();

            assert_eq!(removed, vec!["Old".to_string()]);
            let paths: Vec<String> = store
                .list_mailboxes()
                .await
                .unwrap()
                .into_iter()
                .map(|m| m.path)
                .collect();
            assert_eq!(paths, vec!["INBOX", "Sent"]);
            assert!(store.get_cursor("Old").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn failed_mailboxes_are_kept() {
            let store = MemoryStore::new();
            let broken = descriptor("Broken");
            store.upsert_mailbox(&broken.entry()).await.unwrap();

            let listing = MailboxListing {
                descriptors: vec![descriptor("INBOX")],
                failed: vec![(
                    "Broken".to_string(),
                    Error::Protocol("no UIDVALIDITY reported for Broken".into()),
                )],
            };
            let removed = reconcile_mailbox_list(&store, &listing).await.unwrap();

            assert!(removed.is_empty());
            let paths: Vec<String> = store
                .list_mailboxes()
                .await
                .unwrap()
                .into_iter()
                .map(|m| m.path)
                .collect();
            assert_eq!(paths, vec!["Broken", "INBOX"]);
        }
    }
}
