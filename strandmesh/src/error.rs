use thiserror::Error;

use crate::message::{NodeId, StreamId};
use crate::status::{Status, StatusCode};

/// All errors produced by the StrandMesh routing layer.
#[derive(Debug, Error)]
pub enum StrandMeshError {
    #[error("routing header must have at least one destination")]
    NoDestinations,

    #[error("stream {stream_id} from peer {peer} already has a handler")]
    HandlerAlreadySet { peer: NodeId, stream_id: StreamId },

    #[error("invalid reliability and ordering mode: 0x{0:02x}")]
    InvalidReliabilityMode(u8),

    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("ack frame carries {count} nacks, maximum is {max}")]
    TooManyNacks { count: usize, max: usize },

    #[error("pending queue full ({capacity} entries)")]
    PendingQueueFull { capacity: usize },

    #[error("pending message expired before its destination was bound")]
    PendingExpired,

    #[error("channel closed")]
    ChannelClosed,

    #[error("channel full")]
    ChannelFull,
}

impl StrandMeshError {
    /// The status code this error is reported with on a completion callback.
    pub fn status_code(&self) -> StatusCode {
        match self {
            StrandMeshError::NoDestinations
            | StrandMeshError::InvalidReliabilityMode(_)
            | StrandMeshError::FrameTooShort { .. }
            | StrandMeshError::TooManyNacks { .. } => StatusCode::InvalidArgument,
            StrandMeshError::HandlerAlreadySet { .. } => StatusCode::FailedPrecondition,
            StrandMeshError::PendingQueueFull { .. } | StrandMeshError::ChannelFull => {
                StatusCode::ResourceExhausted
            }
            StrandMeshError::PendingExpired => StatusCode::DeadlineExceeded,
            StrandMeshError::ChannelClosed => StatusCode::Unavailable,
        }
    }
}

impl From<StrandMeshError> for Status {
    fn from(err: StrandMeshError) -> Self {
        Status::new(err.status_code(), err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StrandMeshError>;
