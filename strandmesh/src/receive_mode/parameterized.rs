//! Receive mode chosen at runtime from a [`ReliabilityAndOrdering`] value.

use tracing::warn;

use crate::ack_frame::AckFrame;
use crate::receive_mode::{
    ErrorMode, ReceiveMode, ReliabilityAndOrdering, ReliableOrdered, ReliableUnordered,
    TailReliable, UnreliableOrdered, UnreliableUnordered,
};
use crate::status::{Status, StatusCallback};

/// One of the five concrete modes, or [`ErrorMode`] for an unknown wire tag.
/// Every operation forwards to the selected mode.
pub enum ParameterizedReceiveMode {
    ReliableOrdered(ReliableOrdered),
    UnreliableOrdered(UnreliableOrdered),
    ReliableUnordered(ReliableUnordered),
    UnreliableUnordered(UnreliableUnordered),
    TailReliable(TailReliable),
    Error(ErrorMode),
}

impl ParameterizedReceiveMode {
    pub fn new(mode: ReliabilityAndOrdering) -> Self {
        match mode {
            ReliabilityAndOrdering::ReliableOrdered => {
                Self::ReliableOrdered(ReliableOrdered::new())
            }
            ReliabilityAndOrdering::UnreliableOrdered => {
                Self::UnreliableOrdered(UnreliableOrdered::new())
            }
            ReliabilityAndOrdering::ReliableUnordered => {
                Self::ReliableUnordered(ReliableUnordered::new())
            }
            ReliabilityAndOrdering::UnreliableUnordered => {
                Self::UnreliableUnordered(UnreliableUnordered::new())
            }
            ReliabilityAndOrdering::TailReliable => Self::TailReliable(TailReliable::new()),
        }
    }

    /// Build from a raw wire tag. Unknown tags yield the error mode, which
    /// refuses every payload.
    pub fn from_wire(tag: u8) -> Self {
        match ReliabilityAndOrdering::try_from(tag) {
            Ok(mode) => Self::new(mode),
            Err(err) => {
                warn!(tag, %err, "unknown reliability mode, stream will refuse all payloads");
                Self::Error(ErrorMode::new())
            }
        }
    }

    /// The policy in effect, or `None` for the error mode.
    pub fn mode(&self) -> Option<ReliabilityAndOrdering> {
        match self {
            Self::ReliableOrdered(_) => Some(ReliabilityAndOrdering::ReliableOrdered),
            Self::UnreliableOrdered(_) => Some(ReliabilityAndOrdering::UnreliableOrdered),
            Self::ReliableUnordered(_) => Some(ReliabilityAndOrdering::ReliableUnordered),
            Self::UnreliableUnordered(_) => Some(ReliabilityAndOrdering::UnreliableUnordered),
            Self::TailReliable(_) => Some(ReliabilityAndOrdering::TailReliable),
            Self::Error(_) => None,
        }
    }

    fn inner(&mut self) -> &mut dyn ReceiveMode {
        match self {
            Self::ReliableOrdered(m) => m,
            Self::UnreliableOrdered(m) => m,
            Self::ReliableUnordered(m) => m,
            Self::UnreliableUnordered(m) => m,
            Self::TailReliable(m) => m,
            Self::Error(m) => m,
        }
    }
}

impl From<ReliabilityAndOrdering> for ParameterizedReceiveMode {
    fn from(mode: ReliabilityAndOrdering) -> Self {
        Self::new(mode)
    }
}

impl ReceiveMode for ParameterizedReceiveMode {
    fn begin(&mut self, seq: u64, ready: StatusCallback) -> bool {
        self.inner().begin(seq, ready)
    }

    fn completed(&mut self, seq: u64, status: &Status) -> bool {
        self.inner().completed(seq, status)
    }

    fn generate_ack(&self) -> AckFrame {
        match self {
            Self::ReliableOrdered(m) => m.generate_ack(),
            Self::UnreliableOrdered(m) => m.generate_ack(),
            Self::ReliableUnordered(m) => m.generate_ack(),
            Self::UnreliableUnordered(m) => m.generate_ack(),
            Self::TailReliable(m) => m.generate_ack(),
            Self::Error(m) => m.generate_ack(),
        }
    }
}
