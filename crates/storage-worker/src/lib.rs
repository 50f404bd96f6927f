// Path: crates/storage-worker/src/lib.rs
#![forbid(unsafe_code)]
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! The per-runtime storage sync worker.
//!
//! For every consensus-committed block the worker materializes the block's
//! IO and state roots in the local Merkle store by fetching write-log diffs
//! from peer storage nodes, then finalizes the round and records it in a
//! durable checkpoint. Diff fetches run fully in parallel; applies and
//! finalizes are re-serialized per round by the follower loop.

mod config;
mod fetcher;
mod finalizer;
mod follower;
mod mask;
mod policy;
mod queue;
mod tracker;
mod worker;

pub use config::WorkerConfig;
pub use worker::StorageSyncWorker;
