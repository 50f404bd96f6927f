// Path: crates/storage-worker/src/tracker.rs

use std::collections::HashMap;

use crate::mask::SubtreeMask;

/// Fetch bookkeeping for one in-progress round.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InFlight {
    /// Subtree fetches currently running.
    pub outstanding: SubtreeMask,
    /// Subtree fetches that failed and must be re-issued.
    pub awaiting_retry: SubtreeMask,
}

/// The working set of rounds being synced.
///
/// Owned exclusively by the follower loop; every transition happens on the
/// loop thread, so no locking is involved. An entry exists exactly while
/// `outstanding | awaiting_retry` is non-empty.
#[derive(Debug, Default)]
pub(crate) struct RoundTracker {
    rounds: HashMap<u64, InFlight>,
}

impl RoundTracker {
    /// Creates the round entry with everything awaiting retry, if absent.
    pub(crate) fn ensure(&mut self, round: u64) {
        self.rounds.entry(round).or_insert(InFlight {
            outstanding: SubtreeMask::NONE,
            awaiting_retry: SubtreeMask::ALL,
        });
    }

    pub(crate) fn get(&self, round: u64) -> Option<InFlight> {
        self.rounds.get(&round).copied()
    }

    /// Returns true when every subtree of the round is already being
    /// fetched, i.e. there is nothing to schedule.
    pub(crate) fn fully_outstanding(&self, round: u64) -> bool {
        self.rounds
            .get(&round)
            .map(|f| f.outstanding == SubtreeMask::ALL)
            .unwrap_or(false)
    }

    /// Returns true when the subtree is awaiting retry and not already
    /// outstanding, i.e. a fetch should be submitted.
    pub(crate) fn should_start(&self, round: u64, mask: SubtreeMask) -> bool {
        match self.rounds.get(&round) {
            Some(f) => f.awaiting_retry.contains(mask) && !f.outstanding.contains(mask),
            None => false,
        }
    }

    /// Moves the subtree from awaiting-retry to outstanding.
    pub(crate) fn start(&mut self, round: u64, mask: SubtreeMask) {
        if let Some(f) = self.rounds.get_mut(&round) {
            f.awaiting_retry.remove(mask);
            f.outstanding.insert(mask);
        }
    }

    /// Records a finished fetch. Returns true when the round has nothing
    /// outstanding and nothing awaiting retry; the entry is removed in
    /// that case.
    pub(crate) fn complete(&mut self, round: u64, mask: SubtreeMask) -> bool {
        let Some(f) = self.rounds.get_mut(&round) else {
            return false;
        };
        f.outstanding.remove(mask);
        if f.outstanding.is_empty() && f.awaiting_retry.is_empty() {
            self.rounds.remove(&round);
            return true;
        }
        false
    }

    /// Records a failed fetch; the subtree moves back to awaiting-retry.
    ///
    /// Retries are only re-issued when a later new-block event revisits
    /// scheduling, so a failure on the tail round waits for the next block.
    pub(crate) fn fail(&mut self, round: u64, mask: SubtreeMask) {
        if let Some(f) = self.rounds.get_mut(&round) {
            f.outstanding.remove(mask);
            f.awaiting_retry.insert(mask);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.rounds.len()
    }
}
