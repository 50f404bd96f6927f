// Path: crates/storage-worker/src/finalizer.rs

use std::sync::Arc;

use meridian_api::storage::LocalStore;
use meridian_types::chain::BlockSummary;
use meridian_types::error::StorageError;
use tokio::sync::mpsc;

/// Finalizes one round against the local store and reports completion.
///
/// Completion is reported on every outcome: a failed finalize still
/// advances the checkpoint, leaving the inconsistency to operators. A
/// stuck worker is worse than a logged inconsistency.
pub(crate) async fn finalize(
    local: Arc<dyn LocalStore>,
    summary: BlockSummary,
    done: mpsc::Sender<BlockSummary>,
) {
    let roots = [summary.io_root.hash, summary.state_root.hash];
    match local.finalize(summary.namespace, summary.round, &roots).await {
        Ok(()) => {
            tracing::debug!(
                target: "storage_worker",
                round = summary.round,
                "storage round finalized",
            );
        }
        Err(StorageError::AlreadyFinalized) => {
            // Happens when restoring after a crash that hit between the
            // store finalize and the checkpoint write.
            tracing::warn!(
                target: "storage_worker",
                round = summary.round,
                "storage round already finalized",
            );
        }
        Err(err) => {
            tracing::error!(
                target: "storage_worker",
                err = %err,
                round = summary.round,
                "failed to finalize storage round",
            );
        }
    }

    let _ = done.send(summary).await;
}
