//! Channel-backed [`Link`] and [`StreamHandler`] implementations.
//!
//! These hand routed work to async tasks over bounded `tokio::sync::mpsc`
//! channels. Sends never block the router: a full channel fails the work
//! with `RESOURCE_EXHAUSTED`, a closed one with `UNAVAILABLE`.

use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::error::StrandMeshError;
use crate::message::Message;
use crate::router::{Link, LinkId, StreamHandler};
use crate::status::StatusCallback;

/// A payload delivered to a local stream.
#[derive(Debug)]
pub struct Delivery {
    pub seq: u64,
    pub received: Instant,
    pub payload: Bytes,
    pub done: StatusCallback,
}

/// Stream handler that queues each delivery on a channel.
#[derive(Debug, Clone)]
pub struct ChannelStreamHandler {
    tx: mpsc::Sender<Delivery>,
}

impl ChannelStreamHandler {
    /// Create a handler and the receiver its deliveries arrive on.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl StreamHandler for ChannelStreamHandler {
    fn handle_message(&self, seq: u64, received: Instant, payload: Bytes, done: StatusCallback) {
        let delivery = Delivery {
            seq,
            received,
            payload,
            done,
        };
        match self.tx.try_send(delivery) {
            Ok(()) => {}
            Err(TrySendError::Full(delivery)) => {
                warn!(seq, "stream channel full, dropping delivery");
                delivery.done.call(StrandMeshError::ChannelFull.into());
            }
            Err(TrySendError::Closed(delivery)) => {
                delivery.done.call(StrandMeshError::ChannelClosed.into());
            }
        }
    }
}

/// Link that queues each forwarded message on a channel.
#[derive(Debug, Clone)]
pub struct ChannelLink {
    id: LinkId,
    tx: mpsc::Sender<Message>,
}

impl ChannelLink {
    /// Create a link with the given id and the receiver its messages
    /// arrive on.
    pub fn channel(id: LinkId, capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { id, tx }, rx)
    }
}

impl Link for ChannelLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn forward(&self, message: Message) {
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(link = self.id, "link channel full, dropping message");
                message.done.call(StrandMeshError::ChannelFull.into());
            }
            Err(TrySendError::Closed(message)) => {
                message.done.call(StrandMeshError::ChannelClosed.into());
            }
        }
    }
}
