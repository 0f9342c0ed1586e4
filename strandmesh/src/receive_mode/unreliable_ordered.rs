//! Unreliable-Ordered receive mode -- in-order delivery, losses tolerated.
//!
//! Payloads are released in increasing sequence order, one at a time, but
//! the mode never waits for a missing number: whenever the application is
//! idle, the lowest waiting number is released and everything below it is
//! lost for good. Nothing is nacked.
//!
//! A failed payload is only retried if nothing later is already waiting;
//! otherwise it is skipped like any other gap.

use tracing::debug;

use crate::ack_frame::AckFrame;
use crate::receive_mode::ordered::OrderedSequencer;
use crate::receive_mode::{reject, ReceiveMode, SEQ_LIMIT};
use crate::status::{Status, StatusCallback};

/// Maximum number of parked payloads. Past this, the oldest is dropped.
pub const MAX_DEFERRED: usize = 1024;

pub struct UnreliableOrdered {
    seq: OrderedSequencer,
}

impl UnreliableOrdered {
    pub fn new() -> Self {
        Self {
            seq: OrderedSequencer::new(),
        }
    }
}

impl Default for UnreliableOrdered {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveMode for UnreliableOrdered {
    fn begin(&mut self, seq: u64, ready: StatusCallback) -> bool {
        if seq >= SEQ_LIMIT {
            return reject(seq, ready, "sequence number out of range");
        }
        if self.seq.is_retired(seq) {
            ready.call(Status::cancelled());
            return true;
        }
        if !self.seq.is_busy() {
            if seq > self.seq.next() {
                debug!(seq, next = self.seq.next(), "skipping lost sequence numbers");
            }
            self.seq.start(seq, ready);
            return true;
        }
        self.seq.defer(seq, ready);
        if self.seq.deferred_len() > MAX_DEFERRED {
            self.seq.cancel_first();
        }
        true
    }

    fn completed(&mut self, seq: u64, status: &Status) -> bool {
        if !self.seq.finish(seq, status) {
            return false;
        }
        self.seq.release_first();
        true
    }

    fn generate_ack(&self) -> AckFrame {
        AckFrame::new(self.seq.next(), 0, 0, [])
    }
}
