// Path: crates/api/src/roothash.rs

//! API for the consensus roothash backend.

use async_trait::async_trait;
use meridian_types::chain::{Block, PrunedBlock, RuntimeId};
use meridian_types::error::RoothashError;
use tokio::sync::mpsc;

/// Read access to the consensus-committed block history of a runtime.
///
/// Blocks returned here are trusted; consensus has already verified them.
#[async_trait]
pub trait Roothash: Send + Sync {
    /// Returns the genesis block of the runtime.
    async fn get_genesis_block(&self, runtime_id: RuntimeId) -> Result<Block, RoothashError>;

    /// Returns the block committed at the given round.
    async fn get_block(&self, runtime_id: RuntimeId, round: u64) -> Result<Block, RoothashError>;

    /// Returns the latest committed block.
    async fn get_latest_block(&self, runtime_id: RuntimeId) -> Result<Block, RoothashError>;

    /// Subscribes to notifications about rounds pruned by consensus.
    ///
    /// The subscription lives as long as the returned receiver.
    fn watch_pruned_blocks(&self) -> Result<mpsc::Receiver<PrunedBlock>, RoothashError>;
}
