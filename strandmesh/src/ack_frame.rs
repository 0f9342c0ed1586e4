use std::collections::BTreeSet;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, StrandMeshError};

/// Upper bound on the number of sequence numbers a single ack may nack.
///
/// Receive modes stop collecting gaps once this many have been found; the
/// remainder is requested by later acks once the earliest gaps fill.
pub const MAX_NACKS: usize = 128;

/// Fixed header: ack_to_seq(8) + window_base(8) + window_length(4) + nack_count(2).
const HEADER_LEN: usize = 8 + 8 + 4 + 2;

/// Acknowledgement summary produced by a receive mode.
///
/// Binary layout (all fields big-endian):
///
/// ```text
/// +------------+-------------+---------------+------------+-----------+
/// | ack_to_seq | window_base | window_length | nack_count | nacks     |
/// | (8B)       | (8B)        | (4B)          | (2B)       | (8B * N)  |
/// +------------+-------------+---------------+------------+-----------+
/// ```
///
/// `ack_to_seq` is the first sequence number that has not been fully
/// processed; everything below it is acknowledged. `nacks` lists known gaps
/// at or above it. `window_base`/`window_length` advertise a receive window
/// and are zero when the receiver does not advertise one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckFrame {
    pub ack_to_seq: u64,
    pub window_base: u64,
    pub window_length: u32,
    pub nacks: BTreeSet<u64>,
}

impl AckFrame {
    pub fn new(
        ack_to_seq: u64,
        window_base: u64,
        window_length: u32,
        nacks: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            ack_to_seq,
            window_base,
            window_length,
            nacks: nacks.into_iter().collect(),
        }
    }

    /// The ack of a receiver that has seen nothing yet. Sequence numbers
    /// start at 1.
    pub fn initial() -> Self {
        Self::new(1, 0, 0, [])
    }

    /// Encode this frame into a byte buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode into a pre-allocated `BytesMut`.
    ///
    /// Only the lowest [`MAX_NACKS`] nacks are written.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        let count = self.nacks.len().min(MAX_NACKS);
        buf.put_u64(self.ack_to_seq);
        buf.put_u64(self.window_base);
        buf.put_u32(self.window_length);
        buf.put_u16(count as u16);
        for seq in self.nacks.iter().take(count) {
            buf.put_u64(*seq);
        }
    }

    /// The total number of bytes this frame occupies when encoded.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.nacks.len().min(MAX_NACKS) * 8
    }

    /// Decode a frame from the given byte buffer.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        ensure_len(data, HEADER_LEN)?;
        let ack_to_seq = data.get_u64();
        let window_base = data.get_u64();
        let window_length = data.get_u32();
        let count = data.get_u16() as usize;
        if count > MAX_NACKS {
            return Err(StrandMeshError::TooManyNacks {
                count,
                max: MAX_NACKS,
            });
        }
        ensure_len(data, count * 8)?;
        let mut nacks = BTreeSet::new();
        for _ in 0..count {
            nacks.insert(data.get_u64());
        }
        Ok(Self {
            ack_to_seq,
            window_base,
            window_length,
            nacks,
        })
    }
}

impl Default for AckFrame {
    fn default() -> Self {
        Self::initial()
    }
}

fn ensure_len(data: &[u8], needed: usize) -> Result<()> {
    if data.len() < needed {
        Err(StrandMeshError::FrameTooShort {
            expected: needed,
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}
