// Path: crates/storage-worker/src/worker.rs
//! The storage sync worker service surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use meridian_api::checkpoint::CheckpointStore;
use meridian_api::client::RemoteSyncClient;
use meridian_api::lifecycle::{Container, NodeHooks};
use meridian_api::policy::PolicyController;
use meridian_api::roothash::Roothash;
use meridian_api::storage::{LocalStore, StorageBackend};
use meridian_types::chain::{
    Block, EpochSnapshot, Root, RuntimeId, WatcherState, ROUND_LATEST,
};
use meridian_types::error::WorkerError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::WorkerConfig;
use crate::follower::Follower;
use crate::policy;

type BlockReceiver = Mutex<Option<mpsc::UnboundedReceiver<Block>>>;

/// Watches committed blocks of one runtime and keeps the local Merkle
/// store in sync with their IO and state roots.
pub struct StorageSyncWorker {
    runtime_id: RuntimeId,
    config: WorkerConfig,

    local: Arc<dyn LocalStore>,
    client: Arc<dyn RemoteSyncClient>,
    roothash: Arc<dyn Roothash>,
    checkpoint: Arc<dyn CheckpointStore>,
    policy: Arc<dyn PolicyController>,

    synced_state: Arc<RwLock<WatcherState>>,

    block_tx: mpsc::UnboundedSender<Block>,
    block_rx: BlockReceiver,

    shutdown_tx: watch::Sender<bool>,
    init_tx: watch::Sender<bool>,
    quit_tx: watch::Sender<bool>,

    is_running: AtomicBool,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl StorageSyncWorker {
    /// Creates a new storage sync worker for the given runtime.
    ///
    /// Fails with [`WorkerError::NonLocalBackend`] when the storage backend
    /// doesn't support local operations, and with the client's error when
    /// runtime watch registration fails.
    pub fn new(
        runtime_id: RuntimeId,
        backend: Arc<dyn StorageBackend>,
        client: Arc<dyn RemoteSyncClient>,
        roothash: Arc<dyn Roothash>,
        checkpoint: Arc<dyn CheckpointStore>,
        policy: Arc<dyn PolicyController>,
        config: WorkerConfig,
    ) -> Result<Self, WorkerError> {
        let local = backend
            .as_local_store()
            .ok_or(WorkerError::NonLocalBackend)?;

        let synced_state = checkpoint.get(runtime_id)?.unwrap_or_default();

        client.watch_runtime(runtime_id).map_err(|err| {
            tracing::error!(
                target: "storage_worker",
                err = %err,
                "error watching storage runtime",
            );
            WorkerError::from(err)
        })?;

        let (block_tx, block_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let (init_tx, _) = watch::channel(false);
        let (quit_tx, _) = watch::channel(false);

        Ok(StorageSyncWorker {
            runtime_id,
            config,
            local,
            client,
            roothash,
            checkpoint,
            policy,
            synced_state: Arc::new(RwLock::new(synced_state)),
            block_tx,
            block_rx: Mutex::new(Some(block_rx)),
            shutdown_tx,
            init_tx,
            quit_tx,
            is_running: AtomicBool::new(false),
            task_handles: Mutex::new(Vec::new()),
        })
    }

    /// The runtime this worker syncs.
    pub fn runtime_id(&self) -> RuntimeId {
        self.runtime_id
    }

    /// A signal that flips to true once the follower has finished starting
    /// up and begun consuming events.
    pub fn initialized(&self) -> watch::Receiver<bool> {
        self.init_tx.subscribe()
    }

    /// A signal that flips to true once the follower has stopped.
    pub fn quit(&self) -> watch::Receiver<bool> {
        self.quit_tx.subscribe()
    }

    /// Returns the round, IO root, and state root of the last block that
    /// was fully synced.
    pub fn get_last_synced(&self) -> (u64, Root, Root) {
        let state = match self.synced_state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        (
            state.last_block.round,
            state.last_block.io_root,
            state.last_block.state_root,
        )
    }

    /// Forces a storage finalization for the given round, bypassing the
    /// sync pipeline. Pass [`ROUND_LATEST`] to finalize the latest
    /// committed round. Used for operational recovery.
    pub async fn force_finalize(
        &self,
        runtime_id: RuntimeId,
        round: u64,
    ) -> Result<(), WorkerError> {
        tracing::debug!(
            target: "storage_worker",
            round,
            runtime_id = %runtime_id,
            "forcing round finalization",
        );

        let block = if round == ROUND_LATEST {
            self.roothash.get_latest_block(runtime_id).await?
        } else {
            self.roothash.get_block(runtime_id, round).await?
        };

        let roots = [block.header.io_root, block.header.state_root];
        self.local
            .finalize(block.header.namespace, block.header.round, &roots)
            .await
            .map_err(WorkerError::from)
    }
}

#[async_trait]
impl Container for StorageSyncWorker {
    fn name(&self) -> &'static str {
        "storage-sync-worker"
    }

    fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<(), WorkerError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(WorkerError::AlreadyRunning(self.name().to_string()));
        }

        let block_rx = self
            .block_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| WorkerError::Other("block receiver already taken".to_string()))?;

        let follower = Follower::new(
            self.runtime_id,
            Arc::clone(&self.local),
            Arc::clone(&self.client),
            Arc::clone(&self.roothash),
            Arc::clone(&self.checkpoint),
            Arc::clone(&self.synced_state),
            self.config.clone(),
            block_rx,
            self.shutdown_tx.subscribe(),
        );

        let init_tx = self.init_tx.clone();
        let quit_tx = self.quit_tx.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = follower.run(init_tx).await {
                tracing::error!(
                    target: "storage_worker",
                    err = %err,
                    "storage sync follower terminated",
                );
            }
            let _ = quit_tx.send(true);
        });
        self.task_handles.lock().await.push(handle);

        self.is_running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), WorkerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown_tx.send(true).ok();

        let mut handles = self.task_handles.lock().await;
        for handle in handles.drain(..) {
            handle
                .await
                .map_err(|e| WorkerError::Other(format!("task panicked: {e}")))?;
        }

        self.is_running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl NodeHooks for StorageSyncWorker {
    fn handle_new_block(&self, block: &Block) {
        // The mailbox is unbounded; enqueueing never blocks the committee
        // node's dispatch. Send only fails once the follower is gone.
        if self.block_tx.send(block.clone()).is_err() {
            tracing::debug!(
                target: "storage_worker",
                round = block.header.round,
                "dropping new block, follower has shut down",
            );
        }
    }

    fn handle_epoch_transition(&self, snapshot: &EpochSnapshot) {
        policy::apply_epoch_transition(self.policy.as_ref(), self.runtime_id, snapshot);
    }
}
