//! Routing identifiers and the message envelope handed to the router.

use std::fmt;
use std::time::Instant;

use bytes::Bytes;

use crate::status::StatusCallback;

/// Identifier of a mesh participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an application stream, scoped to the node that sends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stream endpoint hosted on this node: the sending peer plus its stream id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalStreamId {
    pub peer: NodeId,
    pub stream_id: StreamId,
}

impl LocalStreamId {
    pub fn new(peer: NodeId, stream_id: StreamId) -> Self {
        Self { peer, stream_id }
    }
}

impl fmt::Display for LocalStreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.peer, self.stream_id)
    }
}

/// One destination of a routable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub dst: NodeId,
    pub stream_id: StreamId,
    pub seq: u64,
}

impl Destination {
    pub fn new(dst: NodeId, stream_id: StreamId, seq: u64) -> Self {
        Self {
            dst,
            stream_id,
            seq,
        }
    }
}

/// Decoded wire envelope: source, ordered destination list and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutableMessage {
    pub src: NodeId,
    pub destinations: Vec<Destination>,
    pub payload: Bytes,
}

impl RoutableMessage {
    pub fn new(src: NodeId, destinations: Vec<Destination>, payload: Bytes) -> Self {
        Self {
            src,
            destinations,
            payload,
        }
    }

    /// A copy of this message addressed to a different destination set.
    /// The payload is shared, not copied.
    pub fn with_destinations(&self, destinations: Vec<Destination>) -> Self {
        Self {
            src: self.src,
            destinations,
            payload: self.payload.clone(),
        }
    }
}

/// A unit of routing work: the envelope, when it was received, and the
/// callback that settles it once every destination has been handled.
#[derive(Debug)]
pub struct Message {
    pub wire: RoutableMessage,
    pub received: Instant,
    pub done: StatusCallback,
}

impl Message {
    pub fn new(wire: RoutableMessage, received: Instant, done: StatusCallback) -> Self {
        Self {
            wire,
            received,
            done,
        }
    }
}
