//! Reliable-Unordered receive mode -- exactly-once delivery, no ordering.
//!
//! Payloads are released as soon as they arrive. Duplicates of anything in
//! progress or already processed are cancelled, and sequence numbers missing
//! below the highest seen are nacked until they turn up.

use crate::ack_frame::AckFrame;
use crate::receive_mode::unordered::UnorderedTracker;
use crate::receive_mode::{reject, ReceiveMode, MAX_SEQ_HORIZON, SEQ_LIMIT};
use crate::status::{Status, StatusCallback};

pub struct ReliableUnordered {
    tracker: UnorderedTracker,
}

impl ReliableUnordered {
    pub fn new() -> Self {
        Self {
            tracker: UnorderedTracker::new(),
        }
    }
}

impl Default for ReliableUnordered {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveMode for ReliableUnordered {
    fn begin(&mut self, seq: u64, ready: StatusCallback) -> bool {
        if seq >= SEQ_LIMIT || seq >= self.tracker.base() + MAX_SEQ_HORIZON {
            return reject(seq, ready, "beyond reliable horizon");
        }
        if self.tracker.is_retired(seq) {
            ready.call(Status::cancelled());
            return true;
        }
        self.tracker.start(seq);
        ready.call(Status::ok());
        true
    }

    fn completed(&mut self, seq: u64, status: &Status) -> bool {
        self.tracker.finish(seq, status)
    }

    fn generate_ack(&self) -> AckFrame {
        AckFrame::new(self.tracker.base(), 0, 0, self.tracker.nacks())
    }
}
