//! Batched message fetching.

use std::collections::HashSet;

use sagebox_imap::{FetchedMessage, Uid, UidSet};

use crate::error::Result;
use crate::remote::RemoteSession;

/// One fetched batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBatch {
    /// UIDs that were requested.
    pub requested: Vec<Uid>,
    /// Responses for the requested UIDs. Messages expunged in the meantime
    /// are simply absent.
    pub messages: Vec<FetchedMessage>,
}

impl FetchedBatch {
    /// Highest requested UID; the cursor may advance to it once the batch is
    /// committed.
    #[must_use]
    pub fn high_water(&self) -> Option<Uid> {
        self.requested.iter().max().copied()
    }
}

/// Envelope batches over a list of new UIDs, fetched one at a time.
#[derive(Debug, Clone)]
pub struct EnvelopeBatches {
    uids: Vec<Uid>,
    batch_size: usize,
    position: usize,
    with_body: bool,
}

impl EnvelopeBatches {
    /// Prepares batches of `batch_size` over `uids` (sorted ascending here).
    #[must_use]
    pub fn new(mut uids: Vec<Uid>, batch_size: usize, with_body: bool) -> Self {
        uids.sort_unstable();
        uids.dedup();
        Self {
            uids,
            batch_size: batch_size.max(1),
            position: 0,
            with_body,
        }
    }

    /// Number of batches not yet fetched.
    #[must_use]
    pub fn remaining(&self) -> usize {
        (self.uids.len() - self.position).div_ceil(self.batch_size)
    }

    /// Fetches the next batch, or returns `None` when all are done.
    ///
    /// A failed batch is not consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if the UID FETCH command fails.
    pub async fn next_batch<S: RemoteSession>(
        &mut self,
        session: &mut S,
    ) -> Result<Option<FetchedBatch>> {
        let end = (self.position + self.batch_size).min(self.uids.len());
        let requested = &self.uids[self.position..end];
        let Some(set) = UidSet::from_uids(requested.iter().copied()) else {
            return Ok(None);
        };

        let messages = session.fetch_messages(&set, self.with_body).await?;
        let requested = requested.to_vec();
        let messages = only_requested(messages, &requested);
        self.position = end;

        tracing::debug!(
            set = %set,
            requested = requested.len(),
            received = messages.len(),
            "envelope batch fetched"
        );
        Ok(Some(FetchedBatch {
            requested,
            messages,
        }))
    }
}

/// Fetches flags for `uids`, `batch_size` at a time.
///
/// # Errors
///
/// Returns an error if any UID FETCH command fails.
pub async fn fetch_flags<S: RemoteSession>(
    session: &mut S,
    uids: &[Uid],
    batch_size: usize,
) -> Result<Vec<FetchedMessage>> {
    let mut out = Vec::with_capacity(uids.len());
    for chunk in uids.chunks(batch_size.max(1)) {
        let Some(set) = UidSet::from_uids(chunk.iter().copied()) else {
            continue;
        };
        let fetched = session.fetch_flags(&set).await?;
        out.extend(only_requested(fetched, chunk));
    }
    Ok(out)
}

/// Fetches the raw bytes of one message.
///
/// # Errors
///
/// Returns an error if the UID FETCH command fails.
pub async fn fetch_body<S: RemoteSession>(session: &mut S, uid: Uid) -> Result<Option<Vec<u8>>> {
    session.fetch_body(uid).await
}

/// Drops unsolicited responses and duplicates.
fn only_requested(messages: Vec<FetchedMessage>, requested: &[Uid]) -> Vec<FetchedMessage> {
    let wanted: HashSet<Uid> = requested.iter().copied().collect();
    let mut seen = HashSet::with_capacity(messages.len());
    messages
        .into_iter()
        .filter(|message| wanted.contains(&message.uid) && seen.insert(message.uid))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sagebox_imap::Flags;

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    #[test]
    fn remaining_counts_partial_batch() {
        let batches = EnvelopeBatches::new((1..=5).map(uid).collect(), 2, false);
        assert_eq!(batches.remaining(), 3);
        assert_eq!(EnvelopeBatches::new(Vec::new(), 2, false).remaining(), 0);
    }

    #[test]
    fn high_water_is_max_requested() {
        let batch = FetchedBatch {
            requested: vec![uid(3), uid(9), uid(4)],
            messages: Vec::new(),
        };
        assert_eq!(batch.high_water(), Some(uid(9)));
    }

    #[test]
    fn unsolicited_responses_are_dropped() {
        let messages = vec![
            FetchedMessage::flags_only(uid(1), Flags::new()),
            FetchedMessage::flags_only(uid(8), Flags::new()),
            FetchedMessage::flags_only(uid(1), Flags::new()),
            FetchedMessage::flags_only(uid(2), Flags::new()),
        ];
        let kept = only_requested(messages, &[uid(1), uid(2)]);
        let uids: Vec<u32> = kept.iter().map(|m| m.uid.get()).collect();
        assert_eq!(uids, vec![1, 2]);
    }
}
