// Path: crates/api/src/policy.rs

//! Access-control policy types for per-runtime storage RPC.

use std::collections::BTreeSet;

use meridian_types::chain::{NodeId, RuntimeId};

/// A capability a peer node may be granted on this node's storage RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    /// Fetch write-log diffs between two roots.
    FetchDiff,
    /// Submit write logs for unfinalized rounds.
    SubmitWriteLog,
}

/// A set of (node, capability) grants for one runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    grants: BTreeSet<(NodeId, Capability)>,
}

impl AccessPolicy {
    /// Grants a capability to a node. Granting twice is a no-op.
    pub fn grant(&mut self, node: NodeId, capability: Capability) {
        self.grants.insert((node, capability));
    }

    /// Returns true when the node holds the capability.
    pub fn is_allowed(&self, node: NodeId, capability: Capability) -> bool {
        self.grants.contains(&(node, capability))
    }

    /// The number of grants in the policy.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Returns true when no grants have been made.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// Installs per-runtime access policies into the RPC layer.
pub trait PolicyController: Send + Sync {
    /// Replaces the active policy for the runtime.
    fn set_access_policy(&self, runtime_id: RuntimeId, policy: AccessPolicy);
}
