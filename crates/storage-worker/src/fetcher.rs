// Path: crates/storage-worker/src/fetcher.rs

use std::sync::Arc;

use meridian_api::client::RemoteSyncClient;
use meridian_api::storage::LocalStore;
use meridian_types::chain::{Root, WriteLog};
use meridian_types::error::SyncError;
use tokio::sync::mpsc;

use crate::mask::SubtreeMask;
use crate::queue::RoundItem;

/// All the context and outcome of a single diff fetch.
#[derive(Debug)]
pub(crate) struct FetchedDiff {
    pub mask: SubtreeMask,
    /// False when the destination root already exists locally and there is
    /// nothing to apply.
    pub fetched: bool,
    pub err: Option<SyncError>,
    pub round: u64,
    pub prev_root: Root,
    pub this_root: Root,
    pub write_log: WriteLog,
}

impl RoundItem for FetchedDiff {
    fn round(&self) -> u64 {
        self.round
    }
}

/// Fetches the write log linking `prev_root` to `this_root`.
///
/// Exactly one [`FetchedDiff`] is sent on `results` per invocation,
/// whatever the outcome. The fetcher performs no retries; retry policy
/// lives in the follower loop.
pub(crate) async fn fetch_diff(
    local: Arc<dyn LocalStore>,
    client: Arc<dyn RemoteSyncClient>,
    round: u64,
    prev_root: Root,
    this_root: Root,
    mask: SubtreeMask,
    results: mpsc::Sender<FetchedDiff>,
) {
    let mut result = FetchedDiff {
        mask,
        fetched: false,
        err: None,
        round,
        prev_root,
        this_root,
        write_log: WriteLog::new(),
    };

    // Skip roots that already exist locally, e.g. after a restart.
    if !local.has_root(&this_root).await {
        result.fetched = true;
        if this_root.hash == prev_root.hash {
            // Even if has_root returns false the root can still exist if it
            // is equal to the previous root and was emitted by the consensus
            // committee directly (e.g. during an epoch transition). The
            // (empty) write log still has to be applied to register the root
            // at the new round.
        } else {
            tracing::debug!(
                target: "storage_worker",
                old_root = ?prev_root,
                new_root = ?this_root,
                fetch_mask = %mask,
                "calling get_diff",
            );
            match client.get_diff(&prev_root, &this_root).await {
                Ok(mut it) => loop {
                    match it.next_chunk().await {
                        Ok(Some(mut chunk)) => result.write_log.append(&mut chunk),
                        Ok(None) => break,
                        Err(err) => {
                            result.err = Some(err);
                            break;
                        }
                    }
                },
                Err(err) => result.err = Some(err),
            }
        }
    }

    let _ = results.send(result).await;
}
