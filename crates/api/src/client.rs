// Path: crates/api/src/client.rs

//! API for the remote storage sync client.

use async_trait::async_trait;
use meridian_types::chain::{Root, RuntimeId, WriteLog};
use meridian_types::error::SyncError;

/// A streaming iterator over write-log chunks produced by a diff request.
#[async_trait]
pub trait WriteLogIterator: Send {
    /// Returns the next chunk of write-log entries, or `None` once the
    /// stream is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<WriteLog>, SyncError>;
}

/// A client able to fetch storage diffs from peer storage nodes.
///
/// Implementations are expected to observe worker shutdown through their
/// own transport context; in-flight [`get_diff`] streams may then fail
/// with [`SyncError::Cancelled`], which callers discard.
///
/// [`get_diff`]: RemoteSyncClient::get_diff
#[async_trait]
pub trait RemoteSyncClient: Send + Sync {
    /// Registers interest in a runtime so the client tracks its storage
    /// committee.
    fn watch_runtime(&self, runtime_id: RuntimeId) -> Result<(), SyncError>;

    /// Requests the write log linking `prev_root` to `this_root`.
    async fn get_diff(
        &self,
        prev_root: &Root,
        this_root: &Root,
    ) -> Result<Box<dyn WriteLogIterator>, SyncError>;
}
