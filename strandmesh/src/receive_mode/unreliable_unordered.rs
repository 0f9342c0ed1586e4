//! Unreliable-Unordered receive mode -- no ordering, no retransmission.
//!
//! Every sequence number stands alone and is accepted whatever order it
//! arrives in. The only thing cancelled is a provable duplicate: a number
//! still being processed, or one that completed within the trailing window
//! below the highest number seen. Numbers older than the window are
//! accepted again rather than guessed at.

use crate::ack_frame::AckFrame;
use crate::receive_mode::unordered::UnorderedTracker;
use crate::receive_mode::{reject, ReceiveMode, SEQ_LIMIT};
use crate::status::{Status, StatusCallback};

/// Width of the window in which completed numbers are remembered.
pub const UNORDERED_WINDOW: u64 = 1024;

pub struct UnreliableUnordered {
    tracker: UnorderedTracker,
}

impl UnreliableUnordered {
    pub fn new() -> Self {
        Self {
            tracker: UnorderedTracker::new(),
        }
    }
}

impl Default for UnreliableUnordered {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveMode for UnreliableUnordered {
    fn begin(&mut self, seq: u64, ready: StatusCallback) -> bool {
        if seq >= SEQ_LIMIT {
            return reject(seq, ready, "sequence number out of range");
        }
        if self.tracker.is_retired(seq) {
            ready.call(Status::cancelled());
            return true;
        }
        if seq >= self.tracker.ack_to() + UNORDERED_WINDOW {
            self.tracker.advance_to(seq + 1 - UNORDERED_WINDOW);
        }
        self.tracker.start(seq);
        ready.call(Status::ok());
        true
    }

    fn completed(&mut self, seq: u64, status: &Status) -> bool {
        self.tracker.finish(seq, status)
    }

    fn generate_ack(&self) -> AckFrame {
        AckFrame::new(self.tracker.ack_to(), 0, 0, [])
    }
}
