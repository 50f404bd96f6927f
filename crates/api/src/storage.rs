// Path: crates/api/src/storage.rs

//! API for local, content-addressed Merkle storage backends.

use std::sync::Arc;

use async_trait::async_trait;
use meridian_types::chain::{Namespace, Root, RootHash, WriteLog};
use meridian_types::error::StorageError;

/// A storage backend of unknown capability.
///
/// Remote-only backends exist (thin proxies over peer nodes); components
/// that require local operations downcast through [`as_local_store`]
/// and must treat `None` as a fatal construction error.
///
/// [`as_local_store`]: StorageBackend::as_local_store
pub trait StorageBackend: Send + Sync {
    /// Returns the local-operation surface when the backend supports it.
    fn as_local_store(self: Arc<Self>) -> Option<Arc<dyn LocalStore>>;
}

/// The local-operation surface of a Merkle storage backend.
///
/// Implementations must be safe to call concurrently; the sync worker
/// issues `has_root` checks from parallel fetch tasks while applies and
/// finalizes run elsewhere.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Checks whether the given root is already present in the store.
    async fn has_root(&self, root: &Root) -> bool;

    /// Materializes a destination root from a source root plus a write log.
    ///
    /// An empty write log is a valid input and registers `dst_hash` at
    /// `dst_round` without mutating any nodes.
    async fn apply(
        &self,
        namespace: Namespace,
        src_round: u64,
        src_hash: RootHash,
        dst_round: u64,
        dst_hash: RootHash,
        write_log: &WriteLog,
    ) -> Result<(), StorageError>;

    /// Marks the given roots canonical for the round.
    ///
    /// Returns [`StorageError::AlreadyFinalized`] when the round was
    /// finalized previously; callers decide whether that is benign.
    async fn finalize(
        &self,
        namespace: Namespace,
        round: u64,
        roots: &[RootHash],
    ) -> Result<(), StorageError>;

    /// Removes superseded state for an old round. Returns the number of
    /// nodes removed.
    async fn prune(&self, namespace: Namespace, round: u64) -> Result<u64, StorageError>;
}
