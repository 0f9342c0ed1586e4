//! Receive mode for streams whose reliability tag could not be understood.
//!
//! Nothing is ever delivered.

use crate::ack_frame::AckFrame;
use crate::receive_mode::{reject, ReceiveMode};
use crate::status::{Status, StatusCallback};

#[derive(Debug, Default)]
pub struct ErrorMode;

impl ErrorMode {
    pub fn new() -> Self {
        Self
    }
}

impl ReceiveMode for ErrorMode {
    fn begin(&mut self, seq: u64, ready: StatusCallback) -> bool {
        reject(seq, ready, "stream has no valid receive mode")
    }

    fn completed(&mut self, _seq: u64, _status: &Status) -> bool {
        false
    }

    fn generate_ack(&self) -> AckFrame {
        AckFrame::initial()
    }
}
