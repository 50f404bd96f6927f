// Path: crates/types/src/error/mod.rs
//! Core error types for Meridian storage components.

use thiserror::Error;

/// Errors raised by a Merkle storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A generic error originating from the underlying backend.
    #[error("backend error: {0}")]
    Backend(String),
    /// An error occurred while serializing data for storage.
    #[error("encode error: {0}")]
    Encode(String),
    /// An error occurred while deserializing data from storage.
    #[error("decode error: {0}")]
    Decode(String),
    /// The requested root or key was not found in the store.
    #[error("not found")]
    NotFound,
    /// The round has already been finalized.
    ///
    /// Benign during crash recovery, when the store advanced past the
    /// durable checkpoint before the crash.
    #[error("round already finalized")]
    AlreadyFinalized,
}

/// Errors raised by the consensus roothash backend.
#[derive(Error, Debug)]
pub enum RoothashError {
    /// No block exists for the requested round.
    #[error("no block for round {0}")]
    NoBlock(u64),
    /// A generic error originating from the consensus backend.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors raised by the remote storage sync client.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A network-level failure while contacting peer storage nodes.
    #[error("network error: {0}")]
    Network(String),
    /// A failure while consuming a streaming diff.
    #[error("stream error: {0}")]
    Stream(String),
    /// The operation was cancelled by shutdown.
    #[error("cancelled")]
    Cancelled,
}

/// Errors raised by the storage sync worker itself.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The storage backend doesn't support local storage operations.
    #[error("storage: storage backend doesn't support local storage")]
    NonLocalBackend,
    /// The worker is already running.
    #[error("worker '{0}' is already running")]
    AlreadyRunning(String),
    /// A consensus block lookup failed.
    #[error("roothash error: {0}")]
    Roothash(#[from] RoothashError),
    /// A local storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    /// The remote sync client failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
    /// A generic error from service wiring.
    #[error("other error: {0}")]
    Other(String),
}
