//! Receive modes: per-stream sequence tracking under five reliability and
//! ordering policies.
//!
//! A receive mode decides, for each inbound sequence number, whether its
//! payload may be handed to the application now, later, or never, and
//! summarises what it has seen as an [`AckFrame`] for the sender.
//!
//! Sequence numbers start at 1. A mode never holds more state than its
//! policy bounds allow: far-future sequence numbers are either rejected or
//! slide a window, and nack sets are capped at [`MAX_NACKS`].

pub mod error_mode;
pub mod parameterized;
pub mod reliable_ordered;
pub mod reliable_unordered;
pub mod tail_reliable;
pub mod unreliable_ordered;
pub mod unreliable_unordered;

mod ordered;
mod unordered;

use std::collections::BTreeSet;

use tracing::debug;

use crate::ack_frame::{AckFrame, MAX_NACKS};
use crate::error::StrandMeshError;
use crate::status::{Status, StatusCallback};

pub use error_mode::ErrorMode;
pub use parameterized::ParameterizedReceiveMode;
pub use reliable_ordered::ReliableOrdered;
pub use reliable_unordered::ReliableUnordered;
pub use tail_reliable::TailReliable;
pub use unreliable_ordered::UnreliableOrdered;
pub use unreliable_unordered::UnreliableUnordered;

/// Sequence numbers travel as 62-bit varints; anything at or above this
/// limit cannot have come from a well-formed sender.
pub const SEQ_LIMIT: u64 = 1 << 62;

/// How far ahead of the acknowledged point a reliable mode will track a
/// sequence number. Reliable modes must remember every gap in this range.
pub const MAX_SEQ_HORIZON: u64 = 1 << 16;

/// The five reliability/ordering policies, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReliabilityAndOrdering {
    ReliableOrdered = 0,
    UnreliableOrdered = 1,
    ReliableUnordered = 2,
    UnreliableUnordered = 3,
    TailReliable = 4,
}

impl TryFrom<u8> for ReliabilityAndOrdering {
    type Error = StrandMeshError;

    fn try_from(value: u8) -> Result<Self, StrandMeshError> {
        match value {
            0 => Ok(ReliabilityAndOrdering::ReliableOrdered),
            1 => Ok(ReliabilityAndOrdering::UnreliableOrdered),
            2 => Ok(ReliabilityAndOrdering::ReliableUnordered),
            3 => Ok(ReliabilityAndOrdering::UnreliableUnordered),
            4 => Ok(ReliabilityAndOrdering::TailReliable),
            other => Err(StrandMeshError::InvalidReliabilityMode(other)),
        }
    }
}

/// The contract shared by every receive mode.
pub trait ReceiveMode: Send {
    /// Announce that the payload for `seq` has arrived.
    ///
    /// `ready` fires exactly once: `OK` when the payload may be processed,
    /// `CANCELLED` when it must be dropped. It may fire before `begin`
    /// returns or later, from inside a `completed` call.
    ///
    /// Returns `false` when `seq` is invalid for this mode; `ready` has then
    /// already fired with `CANCELLED`.
    fn begin(&mut self, seq: u64, ready: StatusCallback) -> bool;

    /// Report the outcome of processing a payload previously released with
    /// `OK`. Returns `false` if `seq` was not being processed.
    fn completed(&mut self, seq: u64, status: &Status) -> bool;

    /// Summarise the receive state for the sender.
    fn generate_ack(&self) -> AckFrame;
}

/// Resolve `ready` for a sequence number the mode refuses to track.
pub(crate) fn reject(seq: u64, ready: StatusCallback, reason: &'static str) -> bool {
    debug!(seq, reason, "rejecting sequence number");
    ready.call(Status::cancelled());
    false
}

/// Collect the gaps between `from` and the highest sequence number in
/// `present`, which must yield ascending values. Values below `from` are
/// skipped. At most [`MAX_NACKS`] gaps are returned, lowest first, and the
/// walk never visits more than `present` plus that many numbers.
pub(crate) fn collect_nacks<I>(from: u64, present: I) -> BTreeSet<u64>
where
    I: IntoIterator<Item = u64>,
{
    let mut nacks = BTreeSet::new();
    let mut expect = from;
    for seq in present {
        if seq < expect {
            continue;
        }
        while expect < seq {
            if nacks.len() == MAX_NACKS {
                return nacks;
            }
            nacks.insert(expect);
            expect += 1;
        }
        expect = seq + 1;
    }
    nacks
}
