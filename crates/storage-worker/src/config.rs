// Path: crates/storage-worker/src/config.rs
//! Configuration for the storage sync worker.

use serde::{Deserialize, Serialize};

/// Configuration for a per-runtime storage sync worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum number of diff fetches running in parallel.
    #[serde(default = "default_fetch_parallelism")]
    pub fetch_parallelism: usize,
    /// Capacity of the channel carrying fetch results back to the follower.
    #[serde(default = "default_diff_channel_capacity")]
    pub diff_channel_capacity: usize,
}

fn default_fetch_parallelism() -> usize {
    16
}

fn default_diff_channel_capacity() -> usize {
    64
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            fetch_parallelism: default_fetch_parallelism(),
            diff_channel_capacity: default_diff_channel_capacity(),
        }
    }
}
