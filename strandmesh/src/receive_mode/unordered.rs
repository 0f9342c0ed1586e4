//! Shared bookkeeping for the unordered modes.

use std::collections::BTreeSet;

use crate::receive_mode::collect_nacks;
use crate::status::Status;

/// Tracks which sequence numbers are being processed or are done, without
/// imposing any order on them.
///
/// Everything below `base` has completed successfully. `done` holds
/// completed numbers above `base`, but never below `floor`: once the
/// tracking window is pushed forward, what was known below it is forgotten
/// and those numbers are neither retired nor acknowledged as missing.
pub(crate) struct UnorderedTracker {
    base: u64,
    floor: u64,
    in_progress: BTreeSet<u64>,
    done: BTreeSet<u64>,
}

impl UnorderedTracker {
    pub(crate) fn new() -> Self {
        Self {
            base: 1,
            floor: 1,
            in_progress: BTreeSet::new(),
            done: BTreeSet::new(),
        }
    }

    /// Lowest sequence number not known to have completed.
    pub(crate) fn base(&self) -> u64 {
        self.base
    }

    /// The point up to which the sender may consider everything handled.
    pub(crate) fn ack_to(&self) -> u64 {
        self.base.max(self.floor)
    }

    /// Provably a duplicate: completed, or still being processed.
    pub(crate) fn is_retired(&self, seq: u64) -> bool {
        seq < self.base || self.done.contains(&seq) || self.in_progress.contains(&seq)
    }

    pub(crate) fn start(&mut self, seq: u64) {
        self.in_progress.insert(seq);
    }

    /// Returns `false` if `seq` was not in progress. A failed payload goes
    /// back to unseen so it can be begun again.
    pub(crate) fn finish(&mut self, seq: u64, status: &Status) -> bool {
        if !self.in_progress.remove(&seq) {
            return false;
        }
        if status.is_ok() && seq >= self.base && (seq == self.base || seq >= self.floor) {
            self.done.insert(seq);
            self.compact();
        }
        true
    }

    /// Stop tracking completions below `floor`.
    pub(crate) fn advance_to(&mut self, floor: u64) {
        if floor <= self.floor {
            return;
        }
        self.floor = floor;
        self.done = self.done.split_off(&floor);
        self.compact();
    }

    pub(crate) fn nacks(&self) -> BTreeSet<u64> {
        collect_nacks(
            self.base,
            self.in_progress.union(&self.done).copied(),
        )
    }

    fn compact(&mut self) {
        while self.done.first() == Some(&self.base) {
            self.done.pop_first();
            self.base += 1;
        }
    }
}
