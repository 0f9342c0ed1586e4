//! Shared bookkeeping for the ordered modes.

use std::collections::{BTreeMap, BTreeSet};

use crate::receive_mode::collect_nacks;
use crate::status::{Status, StatusCallback};

/// Delivers at most one sequence number at a time, never going backwards.
///
/// `next` is the lowest sequence number that may still be released. While a
/// payload is being processed its number is held in `in_progress`; later
/// arrivals wait in `deferred` with their `ready` callbacks.
pub(crate) struct OrderedSequencer {
    next: u64,
    in_progress: Option<u64>,
    deferred: BTreeMap<u64, StatusCallback>,
}

impl OrderedSequencer {
    pub(crate) fn new() -> Self {
        Self {
            next: 1,
            in_progress: None,
            deferred: BTreeMap::new(),
        }
    }

    pub(crate) fn next(&self) -> u64 {
        self.next
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.in_progress.is_some()
    }

    pub(crate) fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Already released (or skipped), so a new `begin` for it is a duplicate.
    pub(crate) fn is_retired(&self, seq: u64) -> bool {
        seq < self.next || self.in_progress == Some(seq)
    }

    /// Release `seq` to the application. `seq` must not be below `next`.
    pub(crate) fn start(&mut self, seq: u64, ready: StatusCallback) {
        debug_assert!(seq >= self.next);
        self.next = seq;
        self.in_progress = Some(seq);
        ready.call(Status::ok());
    }

    /// Park `ready` until `seq` becomes releasable. A parked callback for the
    /// same number is cancelled in favour of the new one.
    pub(crate) fn defer(&mut self, seq: u64, ready: StatusCallback) {
        if let Some(previous) = self.deferred.insert(seq, ready) {
            previous.call(Status::cancelled());
        }
    }

    /// Record the end of processing for `seq`. Returns `false` if `seq` was
    /// not the number in progress.
    pub(crate) fn finish(&mut self, seq: u64, status: &Status) -> bool {
        if self.in_progress != Some(seq) {
            return false;
        }
        self.in_progress = None;
        if status.is_ok() {
            self.next = self.next.max(seq + 1);
        }
        true
    }

    /// Release the parked callback for `next`, if there is one and nothing is
    /// in progress.
    pub(crate) fn release_next(&mut self) {
        if self.is_busy() {
            return;
        }
        if let Some(ready) = self.deferred.remove(&self.next) {
            self.start(self.next, ready);
        }
    }

    /// Release the lowest parked callback regardless of gaps before it.
    pub(crate) fn release_first(&mut self) {
        if self.is_busy() {
            return;
        }
        if let Some((seq, ready)) = self.deferred.pop_first() {
            self.start(seq, ready);
        }
    }

    /// Cancel the lowest parked callback.
    pub(crate) fn cancel_first(&mut self) {
        if let Some((_, ready)) = self.deferred.pop_first() {
            ready.call(Status::cancelled());
        }
    }

    /// Give up on everything below `floor`: parked callbacks there are
    /// cancelled and `next` moves up. A payload already in progress keeps
    /// running and can still be completed.
    pub(crate) fn skip_to(&mut self, floor: u64) {
        if floor <= self.next {
            return;
        }
        let keep = self.deferred.split_off(&floor);
        let stale = std::mem::replace(&mut self.deferred, keep);
        self.next = floor;
        for ready in stale.into_values() {
            ready.call(Status::cancelled());
        }
    }

    /// Gaps between `next` and the highest parked sequence number.
    pub(crate) fn nacks(&self) -> BTreeSet<u64> {
        collect_nacks(
            self.next,
            self.in_progress
                .into_iter()
                .chain(self.deferred.keys().copied()),
        )
    }
}
