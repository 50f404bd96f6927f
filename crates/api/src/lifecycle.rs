// Path: crates/api/src/lifecycle.rs

//! Service lifecycle and committee-node hook traits.

use async_trait::async_trait;
use meridian_types::chain::{Block, EpochSnapshot};
use meridian_types::error::WorkerError;

/// The lifecycle surface of a long-running worker container.
#[async_trait]
pub trait Container: Send + Sync {
    /// A short, stable name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Returns true while the worker's background tasks are running.
    fn is_running(&self) -> bool;

    /// Starts the worker's background tasks.
    async fn start(&self) -> Result<(), WorkerError>;

    /// Signals shutdown and waits for background tasks to drain.
    async fn stop(&self) -> Result<(), WorkerError>;
}

/// Callbacks invoked by the enclosing committee node.
///
/// All hooks are invoked on the committee node's dispatch thread and must
/// not block; long-running work is handed off to the worker's own tasks.
pub trait NodeHooks: Send + Sync {
    /// Called before the block is handed to the other per-runtime hooks.
    fn handle_new_block_early(&self, _block: &Block) {}

    /// Called for every consensus-committed block of the watched runtime.
    fn handle_new_block(&self, block: &Block);

    /// Called when the committee epoch changes.
    fn handle_epoch_transition(&self, snapshot: &EpochSnapshot);

    /// Called for direct peer messages. Returns true when the message was
    /// consumed by this hook.
    fn handle_peer_message(&self, _payload: &[u8]) -> bool {
        false
    }

    /// Called for roothash events emitted alongside blocks.
    fn handle_event(&self, _payload: &[u8]) {}
}
