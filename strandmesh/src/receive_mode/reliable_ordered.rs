//! Reliable-Ordered receive mode -- strict in-order, gap-free delivery.
//!
//! Only the next expected sequence number is released to the application.
//! Later arrivals are parked until every predecessor has completed, and the
//! gaps before them are nacked so the sender retransmits.

use tracing::trace;

use crate::ack_frame::AckFrame;
use crate::receive_mode::ordered::OrderedSequencer;
use crate::receive_mode::{reject, ReceiveMode, MAX_SEQ_HORIZON, SEQ_LIMIT};
use crate::status::{Status, StatusCallback};

pub struct ReliableOrdered {
    seq: OrderedSequencer,
}

impl ReliableOrdered {
    pub fn new() -> Self {
        Self {
            seq: OrderedSequencer::new(),
        }
    }
}

impl Default for ReliableOrdered {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveMode for ReliableOrdered {
    fn begin(&mut self, seq: u64, ready: StatusCallback) -> bool {
        if seq >= SEQ_LIMIT || seq >= self.seq.next() + MAX_SEQ_HORIZON {
            return reject(seq, ready, "beyond reliable horizon");
        }
        if self.seq.is_retired(seq) {
            ready.call(Status::cancelled());
            return true;
        }
        if seq == self.seq.next() && !self.seq.is_busy() {
            self.seq.start(seq, ready);
        } else {
            trace!(seq, next = self.seq.next(), "parking out-of-order sequence number");
            self.seq.defer(seq, ready);
        }
        true
    }

    fn completed(&mut self, seq: u64, status: &Status) -> bool {
        if !self.seq.finish(seq, status) {
            return false;
        }
        self.seq.release_next();
        true
    }

    fn generate_ack(&self) -> AckFrame {
        AckFrame::new(self.seq.next(), 0, 0, self.seq.nacks())
    }
}
