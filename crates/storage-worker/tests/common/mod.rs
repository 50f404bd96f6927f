// Path: crates/storage-worker/tests/common/mod.rs
//! Mock backends and helpers shared by the worker integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use meridian_api::checkpoint::CheckpointStore;
use meridian_api::client::{RemoteSyncClient, WriteLogIterator};
use meridian_api::lifecycle::Container;
use meridian_api::policy::{AccessPolicy, PolicyController};
use meridian_api::roothash::Roothash;
use meridian_api::storage::{LocalStore, StorageBackend};
use meridian_storage::RedbCheckpointStore;
use meridian_types::chain::{
    Block, BlockHeader, BlockSummary, LogEntry, Namespace, PrunedBlock, Root, RootHash, RuntimeId,
    WatcherState, WriteLog,
};
use meridian_types::error::{RoothashError, StorageError, SyncError};
use meridian_storage_worker::{StorageSyncWorker, WorkerConfig};
use tokio::sync::mpsc;

pub fn runtime_id() -> RuntimeId {
    RuntimeId([0x11; 32])
}

pub fn ns() -> Namespace {
    Namespace::from(runtime_id())
}

pub fn hash(byte: u8) -> RootHash {
    RootHash([byte; 32])
}

pub fn block(round: u64, io: RootHash, state: RootHash) -> Block {
    Block {
        header: BlockHeader {
            namespace: ns(),
            round,
            io_root: io,
            state_root: state,
        },
    }
}

/// A write log with a recognizable payload for the given round/subtree.
pub fn write_log(round: u64, tag: &str) -> WriteLog {
    vec![
        LogEntry {
            key: format!("{tag}/{round}/a").into_bytes(),
            value: vec![round as u8, 1],
        },
        LogEntry {
            key: format!("{tag}/{round}/b").into_bytes(),
            value: vec![round as u8, 2],
        },
        LogEntry {
            key: format!("{tag}/{round}/c").into_bytes(),
            value: vec![round as u8, 3],
        },
    ]
}

// ---- Local store mock ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyCall {
    pub src_round: u64,
    pub src_hash: RootHash,
    pub dst_round: u64,
    pub dst_hash: RootHash,
    pub write_log: WriteLog,
}

#[derive(Default)]
struct LocalStoreInner {
    roots: HashSet<(u64, RootHash)>,
    applies: Vec<ApplyCall>,
    finalizes: Vec<(u64, Vec<RootHash>)>,
    finalized_rounds: HashSet<u64>,
    prunes: Vec<(Namespace, u64)>,
    active_finalizes: usize,
    max_concurrent_finalizes: usize,
}

#[derive(Default)]
pub struct MockLocalStore {
    inner: Mutex<LocalStoreInner>,
}

impl MockLocalStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pre-populates a root, as if a previous run had already applied it.
    pub fn insert_root(&self, round: u64, hash: RootHash) {
        self.inner.lock().unwrap().roots.insert((round, hash));
    }

    /// Marks a round as already finalized, so the next finalize call for it
    /// reports `AlreadyFinalized`.
    pub fn mark_finalized(&self, round: u64) {
        self.inner.lock().unwrap().finalized_rounds.insert(round);
    }

    pub fn applies(&self) -> Vec<ApplyCall> {
        self.inner.lock().unwrap().applies.clone()
    }

    pub fn finalizes(&self) -> Vec<(u64, Vec<RootHash>)> {
        self.inner.lock().unwrap().finalizes.clone()
    }

    pub fn prunes(&self) -> Vec<(Namespace, u64)> {
        self.inner.lock().unwrap().prunes.clone()
    }

    pub fn max_concurrent_finalizes(&self) -> usize {
        self.inner.lock().unwrap().max_concurrent_finalizes
    }
}

#[async_trait]
impl LocalStore for MockLocalStore {
    async fn has_root(&self, root: &Root) -> bool {
        self.inner
            .lock()
            .unwrap()
            .roots
            .contains(&(root.round, root.hash))
    }

    async fn apply(
        &self,
        _namespace: Namespace,
        src_round: u64,
        src_hash: RootHash,
        dst_round: u64,
        dst_hash: RootHash,
        write_log: &WriteLog,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.applies.push(ApplyCall {
            src_round,
            src_hash,
            dst_round,
            dst_hash,
            write_log: write_log.clone(),
        });
        inner.roots.insert((dst_round, dst_hash));
        Ok(())
    }

    async fn finalize(
        &self,
        _namespace: Namespace,
        round: u64,
        roots: &[RootHash],
    ) -> Result<(), StorageError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.finalizes.push((round, roots.to_vec()));
            inner.active_finalizes += 1;
            if inner.active_finalizes > inner.max_concurrent_finalizes {
                inner.max_concurrent_finalizes = inner.active_finalizes;
            }
        }
        // Keep the call in flight long enough for overlap to be observable.
        tokio::time::sleep(Duration::from_millis(2)).await;
        let mut inner = self.inner.lock().unwrap();
        inner.active_finalizes -= 1;
        if !inner.finalized_rounds.insert(round) {
            return Err(StorageError::AlreadyFinalized);
        }
        Ok(())
    }

    async fn prune(&self, namespace: Namespace, round: u64) -> Result<u64, StorageError> {
        self.inner.lock().unwrap().prunes.push((namespace, round));
        Ok(0)
    }
}

impl StorageBackend for MockLocalStore {
    fn as_local_store(self: Arc<Self>) -> Option<Arc<dyn LocalStore>> {
        Some(self)
    }
}

/// A backend without local operations, for construction failure tests.
pub struct RemoteOnlyBackend;

impl StorageBackend for RemoteOnlyBackend {
    fn as_local_store(self: Arc<Self>) -> Option<Arc<dyn LocalStore>> {
        None
    }
}

// ---- Remote sync client mock ----

struct ClientInner {
    diffs: HashMap<(u64, RootHash), WriteLog>,
    fail_once: HashSet<(u64, RootHash)>,
    calls: Vec<(u64, RootHash)>,
    watched: Vec<RuntimeId>,
}

pub struct MockRemoteClient {
    inner: Mutex<ClientInner>,
}

impl MockRemoteClient {
    pub fn new() -> Arc<Self> {
        Arc::new(MockRemoteClient {
            inner: Mutex::new(ClientInner {
                diffs: HashMap::new(),
                fail_once: HashSet::new(),
                calls: Vec::new(),
                watched: Vec::new(),
            }),
        })
    }

    /// Registers the write log served for a diff targeting the given
    /// destination root.
    pub fn set_diff(&self, round: u64, this_hash: RootHash, log: WriteLog) {
        self.inner
            .lock()
            .unwrap()
            .diffs
            .insert((round, this_hash), log);
    }

    /// Makes the next diff request for the destination root fail.
    pub fn fail_once(&self, round: u64, this_hash: RootHash) {
        self.inner
            .lock()
            .unwrap()
            .fail_once
            .insert((round, this_hash));
    }

    pub fn calls(&self) -> Vec<(u64, RootHash)> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn calls_for(&self, round: u64, this_hash: RootHash) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == (round, this_hash))
            .count()
    }

    pub fn watched(&self) -> Vec<RuntimeId> {
        self.inner.lock().unwrap().watched.clone()
    }
}

#[async_trait]
impl RemoteSyncClient for MockRemoteClient {
    fn watch_runtime(&self, runtime_id: RuntimeId) -> Result<(), SyncError> {
        self.inner.lock().unwrap().watched.push(runtime_id);
        Ok(())
    }

    async fn get_diff(
        &self,
        _prev_root: &Root,
        this_root: &Root,
    ) -> Result<Box<dyn WriteLogIterator>, SyncError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (this_root.round, this_root.hash);
        inner.calls.push(key);
        if inner.fail_once.remove(&key) {
            return Err(SyncError::Network("injected diff failure".to_string()));
        }
        let log = inner
            .diffs
            .get(&key)
            .cloned()
            .ok_or_else(|| SyncError::Network(format!("no diff registered for {key:?}")))?;
        Ok(Box::new(ChunkedIterator::new(log)))
    }
}

/// Streams a write log in chunks of two entries, so consumers see more
/// than one chunk for realistic logs.
pub struct ChunkedIterator {
    chunks: VecDeque<WriteLog>,
}

impl ChunkedIterator {
    fn new(log: WriteLog) -> Self {
        let mut chunks = VecDeque::new();
        let mut log = log;
        while !log.is_empty() {
            let rest = log.split_off(log.len().min(2));
            chunks.push_back(log);
            log = rest;
        }
        ChunkedIterator { chunks }
    }
}

#[async_trait]
impl WriteLogIterator for ChunkedIterator {
    async fn next_chunk(&mut self) -> Result<Option<WriteLog>, SyncError> {
        Ok(self.chunks.pop_front())
    }
}

// ---- Roothash mock ----

struct RoothashInner {
    genesis_round: u64,
    blocks: HashMap<u64, Block>,
    latest: Option<u64>,
    prune_tx: Option<mpsc::Sender<PrunedBlock>>,
    block_calls: Vec<u64>,
}

pub struct MockRoothash {
    inner: Mutex<RoothashInner>,
}

impl MockRoothash {
    pub fn new(genesis_round: u64) -> Arc<Self> {
        Arc::new(MockRoothash {
            inner: Mutex::new(RoothashInner {
                genesis_round,
                blocks: HashMap::new(),
                latest: None,
                prune_tx: None,
                block_calls: Vec::new(),
            }),
        })
    }

    pub fn add_block(&self, block: Block) {
        let mut inner = self.inner.lock().unwrap();
        let round = block.header.round;
        inner.blocks.insert(round, block);
        if inner.latest.map(|l| round > l).unwrap_or(true) {
            inner.latest = Some(round);
        }
    }

    /// Rounds requested through `get_block`.
    pub fn block_calls(&self) -> Vec<u64> {
        self.inner.lock().unwrap().block_calls.clone()
    }

    pub async fn emit_pruned(&self, runtime_id: RuntimeId, round: u64) {
        let tx = self
            .inner
            .lock()
            .unwrap()
            .prune_tx
            .clone()
            .expect("watch_pruned_blocks not called");
        tx.send(PrunedBlock { runtime_id, round }).await.unwrap();
    }
}

#[async_trait]
impl Roothash for MockRoothash {
    async fn get_genesis_block(&self, _runtime_id: RuntimeId) -> Result<Block, RoothashError> {
        let inner = self.inner.lock().unwrap();
        inner
            .blocks
            .get(&inner.genesis_round)
            .cloned()
            .ok_or(RoothashError::NoBlock(inner.genesis_round))
    }

    async fn get_block(&self, _runtime_id: RuntimeId, round: u64) -> Result<Block, RoothashError> {
        let mut inner = self.inner.lock().unwrap();
        inner.block_calls.push(round);
        inner
            .blocks
            .get(&round)
            .cloned()
            .ok_or(RoothashError::NoBlock(round))
    }

    async fn get_latest_block(&self, _runtime_id: RuntimeId) -> Result<Block, RoothashError> {
        let inner = self.inner.lock().unwrap();
        let latest = inner.latest.ok_or(RoothashError::NoBlock(0))?;
        inner
            .blocks
            .get(&latest)
            .cloned()
            .ok_or(RoothashError::NoBlock(latest))
    }

    fn watch_pruned_blocks(&self) -> Result<mpsc::Receiver<PrunedBlock>, RoothashError> {
        let (tx, rx) = mpsc::channel(16);
        self.inner.lock().unwrap().prune_tx = Some(tx);
        Ok(rx)
    }
}

// ---- Policy controller mock ----

#[derive(Default)]
pub struct MockPolicyController {
    policies: Mutex<Vec<(RuntimeId, AccessPolicy)>>,
}

impl MockPolicyController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn policies(&self) -> Vec<(RuntimeId, AccessPolicy)> {
        self.policies.lock().unwrap().clone()
    }
}

impl PolicyController for MockPolicyController {
    fn set_access_policy(&self, runtime_id: RuntimeId, policy: AccessPolicy) {
        self.policies.lock().unwrap().push((runtime_id, policy));
    }
}

// ---- Harness ----

pub struct Harness {
    pub worker: StorageSyncWorker,
    pub local: Arc<MockLocalStore>,
    pub client: Arc<MockRemoteClient>,
    pub roothash: Arc<MockRoothash>,
    pub policy: Arc<MockPolicyController>,
    pub checkpoint: Arc<RedbCheckpointStore>,
    _dir: tempfile::TempDir,
}

impl Harness {
    /// Builds a worker over fresh mocks and a real redb checkpoint store.
    pub fn new(genesis_round: u64) -> Self {
        Self::with_seeded_checkpoint(genesis_round, None)
    }

    /// Builds a worker whose checkpoint store already records `last_block`.
    pub fn with_seeded_checkpoint(genesis_round: u64, last_block: Option<BlockSummary>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint =
            Arc::new(RedbCheckpointStore::open(dir.path().join("checkpoint.redb")).unwrap());
        if let Some(last_block) = last_block {
            checkpoint
                .put(runtime_id(), &WatcherState { last_block })
                .unwrap();
        }

        let local = MockLocalStore::new();
        let client = MockRemoteClient::new();
        let roothash = MockRoothash::new(genesis_round);
        let policy = MockPolicyController::new();

        let worker = StorageSyncWorker::new(
            runtime_id(),
            local.clone(),
            client.clone(),
            roothash.clone(),
            checkpoint.clone(),
            policy.clone(),
            WorkerConfig::default(),
        )
        .unwrap();

        Harness {
            worker,
            local,
            client,
            roothash,
            policy,
            checkpoint,
            _dir: dir,
        }
    }

    /// Registers a block with the mock consensus and the diffs needed to
    /// sync it, then returns it.
    pub fn seed_round(&self, round: u64, io: RootHash, state: RootHash) -> Block {
        let block = block(round, io, state);
        self.roothash.add_block(block.clone());
        self.client.set_diff(round, io, write_log(round, "io"));
        self.client
            .set_diff(round, state, write_log(round, "state"));
        block
    }

    pub async fn start(&self) {
        self.worker.start().await.unwrap();
        let mut initialized = self.worker.initialized();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !*initialized.borrow() {
                initialized.changed().await.unwrap();
            }
        })
        .await
        .expect("worker initialization timed out");
    }

    pub async fn stop(&self) {
        self.worker.stop().await.unwrap();
    }

    /// Polls until the persisted checkpoint reaches the given round.
    pub async fn wait_synced(&self, round: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if self.worker.get_last_synced().0 == round {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "timed out waiting for round {round}; last synced is {}",
                self.worker.get_last_synced().0
            )
        });
    }

    /// Polls until the remote client has seen `count` diff calls for the
    /// given destination root.
    pub async fn wait_diff_calls(&self, round: u64, this_hash: RootHash, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if self.client.calls_for(round, this_hash) >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for diff calls");
    }
}
