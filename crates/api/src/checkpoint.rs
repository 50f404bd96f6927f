// Path: crates/api/src/checkpoint.rs

//! API for the durable per-runtime sync checkpoint.

use meridian_types::chain::{RuntimeId, WatcherState};
use meridian_types::error::StorageError;

/// A durable key-value record of the last fully synced block, keyed by
/// runtime id.
///
/// `put` must be atomic: a crash mid-write leaves either the previous or
/// the new state readable, never a torn record.
pub trait CheckpointStore: Send + Sync {
    /// Loads the watcher state for a runtime, or `None` when the runtime
    /// has never been synced.
    fn get(&self, runtime_id: RuntimeId) -> Result<Option<WatcherState>, StorageError>;

    /// Atomically replaces the watcher state for a runtime.
    fn put(&self, runtime_id: RuntimeId, state: &WatcherState) -> Result<(), StorageError>;
}
