// Path: crates/types/src/chain/mod.rs
//! Chain-level data structures: roots, blocks, and sync summaries.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A magic round value denoting the latest committed round.
pub const ROUND_LATEST: u64 = u64::MAX;

/// The sentinel round recorded before anything has ever been synced.
pub const UNDEFINED_ROUND: u64 = u64::MAX;

/// A fixed-size, 32-byte Merkle root hash.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Encode, Decode,
)]
pub struct RootHash(pub [u8; 32]);

impl RootHash {
    /// The hash denoting an empty subtree.
    pub const EMPTY: RootHash = RootHash([0u8; 32]);

    /// Returns true if this is the empty-subtree hash.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl std::fmt::Debug for RootHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RootHash({})", hex::encode(self.0))
    }
}

impl std::fmt::Display for RootHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// The 32-byte chain namespace a runtime's storage lives under.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Encode, Decode,
)]
pub struct Namespace(pub [u8; 32]);

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Namespace({})", hex::encode(self.0))
    }
}

/// The stable, 32-byte identifier of a runtime.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Encode, Decode,
)]
pub struct RuntimeId(pub [u8; 32]);

impl std::fmt::Debug for RuntimeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RuntimeId({})", hex::encode(self.0))
    }
}

impl std::fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<RuntimeId> for Namespace {
    fn from(id: RuntimeId) -> Self {
        Namespace(id.0)
    }
}

/// The stable identifier of a node participating in a committee.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, Encode,
    Decode,
)]
pub struct NodeId(pub [u8; 32]);

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", hex::encode(self.0))
    }
}

/// A versioned Merkle tree identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct Root {
    /// The namespace the tree belongs to.
    pub namespace: Namespace,
    /// The round this version of the tree was committed at.
    pub round: u64,
    /// The root hash of the tree.
    pub hash: RootHash,
}

impl Root {
    /// Constructs the root of an empty tree at the given namespace and round.
    pub fn empty_at(namespace: Namespace, round: u64) -> Self {
        Root {
            namespace,
            round,
            hash: RootHash::EMPTY,
        }
    }
}

/// A single key/value mutation in a write log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct LogEntry {
    /// The key being written.
    pub key: Vec<u8>,
    /// The value written under the key. Empty denotes a deletion.
    pub value: Vec<u8>,
}

/// An ordered sequence of mutations linking two roots.
pub type WriteLog = Vec<LogEntry>;

/// The header of a consensus-committed block, reduced to the fields the
/// storage layer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct BlockHeader {
    /// The namespace this block belongs to.
    pub namespace: Namespace,
    /// The round this block was committed at.
    pub round: u64,
    /// The Merkle root of transaction inputs and outputs.
    pub io_root: RootHash,
    /// The Merkle root of runtime state at the end of the round.
    pub state_root: RootHash,
}

/// A consensus-committed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Block {
    /// The block header.
    pub header: BlockHeader,
}

/// A short summary of a single block, suitable for persisting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct BlockSummary {
    /// The namespace the block belongs to.
    pub namespace: Namespace,
    /// The round the block was committed at.
    pub round: u64,
    /// The versioned IO root pinned by the block header.
    pub io_root: Root,
    /// The versioned state root pinned by the block header.
    pub state_root: Root,
}

impl BlockSummary {
    /// Builds a summary from a block header.
    pub fn from_block(block: &Block) -> Self {
        BlockSummary {
            namespace: block.header.namespace,
            round: block.header.round,
            io_root: Root {
                namespace: block.header.namespace,
                round: block.header.round,
                hash: block.header.io_root,
            },
            state_root: Root {
                namespace: block.header.namespace,
                round: block.header.round,
                hash: block.header.state_root,
            },
        }
    }
}

/// The persistent per-runtime sync watcher state.
///
/// The encoding of this type is part of the on-disk format and must stay
/// stable across software upgrades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct WatcherState {
    /// The last block whose finalize has been durably recorded.
    pub last_block: BlockSummary,
}

impl Default for WatcherState {
    fn default() -> Self {
        WatcherState {
            last_block: BlockSummary {
                namespace: Namespace::default(),
                round: UNDEFINED_ROUND,
                io_root: Root::default(),
                state_root: Root::default(),
            },
        }
    }
}

/// A notification that consensus has pruned a historical round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct PrunedBlock {
    /// The runtime whose round was pruned.
    pub runtime_id: RuntimeId,
    /// The pruned round.
    pub round: u64,
}

/// A snapshot of the committees active for an epoch, as provided by the
/// enclosing committee node on epoch transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSnapshot {
    /// Nodes in the executor committee for this epoch.
    pub executor_committee: Vec<NodeId>,
    /// Nodes in the transaction scheduler committee for this epoch.
    pub scheduler_committee: Vec<NodeId>,
    /// All registered storage nodes.
    pub storage_nodes: Vec<NodeId>,
}
