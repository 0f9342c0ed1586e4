//! Tail-Reliable receive mode -- ordered delivery where only the most recent
//! stretch of the stream is kept reliable.
//!
//! Within a window of [`TAIL_WINDOW`] sequence numbers ending at the highest
//! number seen, the mode behaves like Reliable-Ordered: payloads are released
//! strictly in order and gaps are nacked. When a newer number arrives past
//! the window, everything that fell out of it is abandoned: payloads still
//! parked below the new floor get `CANCELLED`, and later arrivals below it are
//! cancelled as duplicates.

use tracing::debug;

use crate::ack_frame::AckFrame;
use crate::receive_mode::ordered::OrderedSequencer;
use crate::receive_mode::{reject, ReceiveMode, SEQ_LIMIT};
use crate::status::{Status, StatusCallback};

/// Number of trailing sequence numbers that are delivered reliably.
///
/// A number at or beyond `next + TAIL_WINDOW` moves the window forward in one
/// jump. That abandons every number below the new floor, not only the ones
/// already resolved: callbacks parked there fire `CANCELLED`.
pub const TAIL_WINDOW: u64 = 64;

pub struct TailReliable {
    seq: OrderedSequencer,
}

impl TailReliable {
    pub fn new() -> Self {
        Self {
            seq: OrderedSequencer::new(),
        }
    }
}

impl Default for TailReliable {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveMode for TailReliable {
    fn begin(&mut self, seq: u64, ready: StatusCallback) -> bool {
        if seq >= SEQ_LIMIT {
            return reject(seq, ready, "sequence number out of range");
        }
        if self.seq.is_retired(seq) {
            ready.call(Status::cancelled());
            return true;
        }
        if seq >= self.seq.next() + TAIL_WINDOW {
            let floor = seq + 1 - TAIL_WINDOW;
            debug!(seq, from = self.seq.next(), to = floor, "tail window advanced");
            self.seq.skip_to(floor);
        }
        if seq == self.seq.next() && !self.seq.is_busy() {
            self.seq.start(seq, ready);
        } else {
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
