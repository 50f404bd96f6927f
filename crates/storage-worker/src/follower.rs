// Path: crates/storage-worker/src/follower.rs
//! The block-follower state machine.
//!
//! A single task owns every mutable working set. When a new block comes in,
//! its state and IO roots are inspected and their write logs fetched from
//! remote storage nodes in case we don't have them locally yet. Fetches are
//! asynchronous and, once complete, trigger local apply operations. These
//! are serialized per round (all applies for a given round have to be
//! complete before applying anything for following rounds) using the
//! `diffs` priority queue. Once a round has all its write logs applied, a
//! finalize for it is triggered, again serialized by round but otherwise
//! asynchronous (the `applieds` queue and `cached_last_round`).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use meridian_api::checkpoint::CheckpointStore;
use meridian_api::client::RemoteSyncClient;
use meridian_api::roothash::Roothash;
use meridian_api::storage::LocalStore;
use meridian_types::chain::{
    Block, BlockSummary, Namespace, PrunedBlock, Root, RuntimeId, WatcherState, UNDEFINED_ROUND,
};
use meridian_types::error::WorkerError;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;

use crate::config::WorkerConfig;
use crate::fetcher::{self, FetchedDiff};
use crate::finalizer;
use crate::mask::SubtreeMask;
use crate::queue::OutOfOrderQueue;
use crate::tracker::RoundTracker;

pub(crate) struct Follower {
    runtime_id: RuntimeId,
    local: Arc<dyn LocalStore>,
    client: Arc<dyn RemoteSyncClient>,
    roothash: Arc<dyn Roothash>,
    checkpoint: Arc<dyn CheckpointStore>,
    synced_state: Arc<RwLock<WatcherState>>,

    block_rx: mpsc::UnboundedReceiver<Block>,
    diff_tx: mpsc::Sender<FetchedDiff>,
    diff_rx: mpsc::Receiver<FetchedDiff>,
    finalize_tx: mpsc::Sender<BlockSummary>,
    finalize_rx: mpsc::Receiver<BlockSummary>,
    shutdown_rx: watch::Receiver<bool>,

    fetch_pool: Arc<Semaphore>,
    tasks: JoinSet<()>,

    /// The round value meaning "nothing synced yet", derived from the
    /// genesis round at startup.
    undefined_round: u64,
    /// The last round whose finalize completion has been observed.
    cached_last_round: u64,
    /// The last round whose diffs have all been applied.
    last_fully_applied_round: u64,
    syncing_rounds: RoundTracker,
    hash_cache: HashMap<u64, BlockSummary>,
    diffs: OutOfOrderQueue<FetchedDiff>,
    applieds: OutOfOrderQueue<BlockSummary>,

    blocks_closed: bool,
    prune_closed: bool,
}

impl Follower {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        runtime_id: RuntimeId,
        local: Arc<dyn LocalStore>,
        client: Arc<dyn RemoteSyncClient>,
        roothash: Arc<dyn Roothash>,
        checkpoint: Arc<dyn CheckpointStore>,
        synced_state: Arc<RwLock<WatcherState>>,
        config: WorkerConfig,
        block_rx: mpsc::UnboundedReceiver<Block>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let (diff_tx, diff_rx) = mpsc::channel(config.diff_channel_capacity.max(1));
        // Capacity one: together with the applieds pop discipline below this
        // keeps at most one finalize in flight.
        let (finalize_tx, finalize_rx) = mpsc::channel(1);
        let fetch_pool = Arc::new(Semaphore::new(config.fetch_parallelism.max(1)));

        Follower {
            runtime_id,
            local,
            client,
            roothash,
            checkpoint,
            synced_state,
            block_rx,
            diff_tx,
            diff_rx,
            finalize_tx,
            finalize_rx,
            shutdown_rx,
            fetch_pool,
            tasks: JoinSet::new(),
            undefined_round: UNDEFINED_ROUND,
            cached_last_round: UNDEFINED_ROUND,
            last_fully_applied_round: UNDEFINED_ROUND,
            syncing_rounds: RoundTracker::default(),
            hash_cache: HashMap::new(),
            diffs: OutOfOrderQueue::new(),
            applieds: OutOfOrderQueue::new(),
            blocks_closed: false,
            prune_closed: false,
        }
    }

    /// Runs the follower until shutdown or an unrecoverable error.
    ///
    /// `init_tx` is signalled once startup state has been established and
    /// the loop is about to start consuming events.
    pub(crate) async fn run(mut self, init_tx: watch::Sender<bool>) -> Result<(), WorkerError> {
        tracing::info!(
            target: "storage_worker",
            runtime_id = %self.runtime_id,
            "starting storage sync follower",
        );

        let genesis = match self.roothash.get_genesis_block(self.runtime_id).await {
            Ok(block) => block,
            Err(err) => {
                tracing::error!(target: "storage_worker", err = %err, "can't retrieve genesis block");
                return Err(err.into());
            }
        };
        self.undefined_round = genesis.header.round.wrapping_sub(1);

        let mut prune_rx = match self.roothash.watch_pruned_blocks() {
            Ok(rx) => rx,
            Err(err) => {
                tracing::error!(target: "storage_worker", err = %err, "failed to watch pruned blocks");
                return Err(err.into());
            }
        };

        let last_synced_round = {
            let state = match self.synced_state.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.last_block.round
        };
        self.cached_last_round =
            if last_synced_round == UNDEFINED_ROUND || last_synced_round < genesis.header.round {
                self.undefined_round
            } else {
                last_synced_round
            };
        self.last_fully_applied_round = self.cached_last_round;

        tracing::info!(
            target: "storage_worker",
            genesis_round = genesis.header.round,
            last_synced = self.cached_last_round,
            "storage sync follower initialized",
        );
        let _ = init_tx.send(true);

        let result = self.main_loop(&mut prune_rx).await;
        self.drain_tasks().await;
        result
    }

    async fn main_loop(
        &mut self,
        prune_rx: &mut mpsc::Receiver<PrunedBlock>,
    ) -> Result<(), WorkerError> {
        loop {
            // Drain the apply and finalize queues first, before waiting for
            // new events in the select below. Applies are drained first,
            // followed by finalizations.
            let next_apply_round = self.last_fully_applied_round.wrapping_add(1);
            if let Some(diff) = self.diffs.pop_if_round(next_apply_round) {
                self.apply_ordered_diff(diff).await;
                continue;
            }

            let next_finalize_round = self.cached_last_round.wrapping_add(1);
            if let Some(summary) = self.applieds.pop_if_round(next_finalize_round) {
                self.spawn_finalize(summary);
                continue;
            }

            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                }

                pruned = prune_rx.recv(), if !self.prune_closed => match pruned {
                    Some(pruned) => self.handle_pruned_block(pruned).await,
                    None => self.prune_closed = true,
                },

                block = self.block_rx.recv(), if !self.blocks_closed => match block {
                    Some(block) => self.handle_new_block(block).await?,
                    None => self.blocks_closed = true,
                },

                Some(diff) = self.diff_rx.recv() => self.handle_fetch_result(diff),

                Some(finalized) = self.finalize_rx.recv() => self.handle_finalize_completion(finalized),

                // Reap finished fetch and finalize tasks as they complete.
                Some(_) = self.tasks.join_next() => {}
            }
        }

        Ok(())
    }

    /// Applies a diff popped in round order and advances the round when it
    /// was the last outstanding fetch.
    async fn apply_ordered_diff(&mut self, diff: FetchedDiff) {
        if diff.fetched {
            if let Err(err) = self
                .local
                .apply(
                    diff.this_root.namespace,
                    diff.prev_root.round,
                    diff.prev_root.hash,
                    diff.this_root.round,
                    diff.this_root.hash,
                    &diff.write_log,
                )
                .await
            {
                // A failed apply of a committed diff indicates a bug or a
                // disk fault; the next finalize surfaces the inconsistency.
                tracing::error!(
                    target: "storage_worker",
                    err = %err,
                    old_root = ?diff.prev_root,
                    new_root = ?diff.this_root,
                    "can't apply write log",
                );
            }
        }

        if self.syncing_rounds.complete(diff.round, diff.mask) {
            tracing::debug!(target: "storage_worker", round = diff.round, "finished syncing round");
            let summary = self.hash_cache.get(&diff.round).cloned();
            self.hash_cache.remove(&diff.round.wrapping_sub(1));
            self.last_fully_applied_round = diff.round;
            match summary {
                Some(summary) => self.applieds.push(summary),
                None => tracing::error!(
                    target: "storage_worker",
                    round = diff.round,
                    "no cached summary for fully applied round",
                ),
            }
        }
    }

    /// Finalizes storage for a round. This happens asynchronously with
    /// respect to applies for subsequent rounds.
    fn spawn_finalize(&mut self, summary: BlockSummary) {
        let local = Arc::clone(&self.local);
        let done = self.finalize_tx.clone();
        self.tasks.spawn(async move {
            finalizer::finalize(local, summary, done).await;
        });
    }

    fn handle_finalize_completion(&mut self, finalized: BlockSummary) {
        {
            let mut state = match self.synced_state.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.last_block = finalized.clone();
            if let Err(err) = self.checkpoint.put(
                self.runtime_id,
                &WatcherState {
                    last_block: finalized.clone(),
                },
            ) {
                tracing::error!(
                    target: "storage_worker",
                    err = %err,
                    "can't store watcher state to database",
                );
            }
        }
        self.cached_last_round = finalized.round;
    }

    fn handle_fetch_result(&mut self, diff: FetchedDiff) {
        if let Some(err) = &diff.err {
            tracing::error!(
                target: "storage_worker",
                err = %err,
                round = diff.round,
                old_root = ?diff.prev_root,
                new_root = ?diff.this_root,
                fetch_mask = %diff.mask,
                "error fetching diff",
            );
            self.syncing_rounds.fail(diff.round, diff.mask);
        } else {
            self.diffs.push(diff);
        }
    }

    async fn handle_pruned_block(&self, pruned: PrunedBlock) {
        tracing::debug!(target: "storage_worker", round = pruned.round, "pruning storage for round");
        let namespace = Namespace::from(pruned.runtime_id);
        if let Err(err) = self.local.prune(namespace, pruned.round).await {
            tracing::error!(target: "storage_worker", err = %err, "failed to prune round");
        }
    }

    async fn handle_new_block(&mut self, block: Block) -> Result<(), WorkerError> {
        let round = block.header.round;
        tracing::debug!(
            target: "storage_worker",
            round,
            last_synced = self.cached_last_round,
            "incoming block",
        );

        if self.cached_last_round == self.undefined_round
            && !self.hash_cache.contains_key(&self.cached_last_round)
        {
            // Synthesize an empty previous block so the first real round
            // diffs both subtrees against an empty base.
            let base_round = self.cached_last_round.wrapping_add(1);
            self.hash_cache.insert(
                self.cached_last_round,
                BlockSummary {
                    namespace: block.header.namespace,
                    round: base_round,
                    io_root: Root::empty_at(block.header.namespace, base_round),
                    state_root: Root::empty_at(block.header.namespace, base_round),
                },
            );
        }

        // Determine if any old block summaries need fetching. When the
        // cached round is the undefined sentinel, start one round later so
        // the all-ones value never enters the range.
        let mut start_summary_round = self.cached_last_round;
        if start_summary_round == self.undefined_round {
            start_summary_round = start_summary_round.wrapping_add(1);
        }
        for i in start_summary_round..round {
            if self.hash_cache.contains_key(&i) {
                continue;
            }
            // This lookup is synchronous with respect to the loop and can
            // stall event draining on a slow consensus backend.
            let old_block = match self.roothash.get_block(self.runtime_id, i).await {
                Ok(block) => block,
                Err(err) => {
                    tracing::error!(
                        target: "storage_worker",
                        err = %err,
                        round = i,
                        current_round = round,
                        "can't get block for round",
                    );
                    return Err(err.into());
                }
            };
            self.hash_cache.insert(i, BlockSummary::from_block(&old_block));
        }
        if !self.hash_cache.contains_key(&round) {
            self.hash_cache.insert(round, BlockSummary::from_block(&block));
        }

        // Schedule any missing subtree fetches for every round between the
        // last finalized one and the incoming block.
        let mut i = self.cached_last_round.wrapping_add(1);
        while i <= round {
            // Rounds the apply pipeline has already passed are awaiting
            // finalization only. Re-creating tracker state for them would
            // re-fetch their diffs, and a diff at or below the applied
            // watermark can never be popped again.
            if self.last_fully_applied_round != self.undefined_round
                && i <= self.last_fully_applied_round
            {
                i = i.wrapping_add(1);
                continue;
            }
            if self.syncing_rounds.fully_outstanding(i) {
                i = i.wrapping_add(1);
                continue;
            }
            self.syncing_rounds.ensure(i);
            if let Some(in_flight) = self.syncing_rounds.get(i) {
                tracing::debug!(
                    target: "storage_worker",
                    round = i,
                    outstanding_mask = %in_flight.outstanding,
                    awaiting_retry = %in_flight.awaiting_retry,
                    "preparing round sync",
                );
            }

            let (prev_state_root, this) = match (
                self.hash_cache.get(&i.wrapping_sub(1)),
                self.hash_cache.get(&i),
            ) {
                (Some(prev), Some(this)) => (prev.state_root, this.clone()),
                _ => {
                    tracing::error!(
                        target: "storage_worker",
                        round = i,
                        "missing cached block summary for round",
                    );
                    i = i.wrapping_add(1);
                    continue;
                }
            };
            // IO roots aren't chained across rounds, so the previous IO
            // root is always the empty one at this round.
            let prev_io_root = Root::empty_at(this.io_root.namespace, this.io_root.round);

            if self.syncing_rounds.should_start(i, SubtreeMask::IO) {
                self.syncing_rounds.start(i, SubtreeMask::IO);
                self.spawn_fetch(i, prev_io_root, this.io_root, SubtreeMask::IO);
            }
            if self.syncing_rounds.should_start(i, SubtreeMask::STATE) {
                self.syncing_rounds.start(i, SubtreeMask::STATE);
                self.spawn_fetch(i, prev_state_root, this.state_root, SubtreeMask::STATE);
            }

            i = i.wrapping_add(1);
        }

        Ok(())
    }

    fn spawn_fetch(&mut self, round: u64, prev_root: Root, this_root: Root, mask: SubtreeMask) {
        let local = Arc::clone(&self.local);
        let client = Arc::clone(&self.client);
        let results = self.diff_tx.clone();
        let pool = Arc::clone(&self.fetch_pool);
        self.tasks.spawn(async move {
            // A pool permit is held for the duration of the fetch, bounding
            // concurrent remote requests across all rounds.
            let _permit = match pool.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            fetcher::fetch_diff(local, client, round, prev_root, this_root, mask, results).await;
        });
    }

    /// Waits for all outstanding fetch and finalize tasks. Late results
    /// are received and dropped so tasks blocked on the bounded channels
    /// can finish.
    async fn drain_tasks(&mut self) {
        loop {
            tokio::select! {
                joined = self.tasks.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
                Some(_) = self.diff_rx.recv() => {}
                Some(_) = self.finalize_rx.recv() => {}
            }
        }
    }
}
