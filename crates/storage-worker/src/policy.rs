// Path: crates/storage-worker/src/policy.rs
//! Storage RPC access policy, rebuilt on committee epoch transitions.

use meridian_api::policy::{AccessPolicy, Capability, PolicyController};
use meridian_types::chain::{EpochSnapshot, RuntimeId};

/// Builds the access policy for the current epoch: committee members may
/// submit write logs for unfinalized rounds, registered storage nodes may
/// fetch diffs for replication.
pub(crate) fn build_policy(snapshot: &EpochSnapshot) -> AccessPolicy {
    let mut policy = AccessPolicy::default();
    for node in &snapshot.executor_committee {
        policy.grant(*node, Capability::SubmitWriteLog);
    }
    for node in &snapshot.scheduler_committee {
        policy.grant(*node, Capability::SubmitWriteLog);
    }
    for node in &snapshot.storage_nodes {
        policy.grant(*node, Capability::FetchDiff);
    }
    policy
}

pub(crate) fn apply_epoch_transition(
    controller: &dyn PolicyController,
    runtime_id: RuntimeId,
    snapshot: &EpochSnapshot,
) {
    let policy = build_policy(snapshot);
    tracing::debug!(
        target: "storage_worker",
        grants = policy.len(),
        "setting new storage access policy",
    );
    controller.set_access_policy(runtime_id, policy);
}
