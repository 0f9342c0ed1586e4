//! Node-local message router.
//!
//! The router resolves every destination of an inbound message to either a
//! local stream handler (the destination is this node) or the link towards a
//! remote peer, and hands the payload over. Streams and links may be
//! registered after traffic for them has arrived: until then, messages wait
//! in a bounded per-stream or per-peer queue and are flushed, in arrival
//! order, the moment the handler or link is bound.
//!
//! Messages with several destinations are fanned out. Destinations reached
//! over the same link are re-merged into a single multicast message, and the
//! original completion callback fires once, after every destination has
//! settled (or as soon as one fails).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::broadcast::Broadcast;
use crate::error::{Result, StrandMeshError};
use crate::message::{Destination, LocalStreamId, Message, NodeId, RoutableMessage, StreamId};
use crate::status::{Status, StatusCallback};

/// A link's self-reported id, used in log output. Multicast regrouping goes
/// by the link object itself, so two distinct links may report the same id.
pub type LinkId = u64;

/// Receives payloads addressed to a stream hosted on this node.
pub trait StreamHandler: Send + Sync {
    /// Process the payload carried under sequence number `seq`. `done` must
    /// eventually be settled; dropping it reports `CANCELLED`.
    fn handle_message(&self, seq: u64, received: Instant, payload: Bytes, done: StatusCallback);
}

/// The next hop towards one or more remote peers.
pub trait Link: Send + Sync {
    fn id(&self) -> LinkId;

    /// Send `message` on towards its destinations.
    fn forward(&self, message: Message);
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Messages buffered per stream before a handler is registered.
    pub max_pending_per_stream: usize,
    /// Messages buffered per peer before a link is registered.
    pub max_pending_per_link: usize,
    /// Age after which a buffered message is failed by
    /// [`Router::evict_expired`]. `None` keeps messages indefinitely.
    pub pending_timeout: Option<Duration>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_pending_per_stream: 256,
            max_pending_per_link: 256,
            pending_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// A unit of work that can sit in a pending queue.
trait Deferred {
    fn received(&self) -> Instant;
    fn fail(self, status: Status);
}

struct PendingStreamMessage {
    seq: u64,
    received: Instant,
    payload: Bytes,
    done: StatusCallback,
}

impl Deferred for PendingStreamMessage {
    fn received(&self) -> Instant {
        self.received
    }

    fn fail(self, status: Status) {
        self.done.call(status);
    }
}

impl Deferred for Message {
    fn received(&self) -> Instant {
        self.received
    }

    fn fail(self, status: Status) {
        self.done.call(status);
    }
}

/// Bounded FIFO of work waiting for a binding. Storage is only allocated
/// while something is queued.
struct PendingQueue<T> {
    capacity: usize,
    entries: Option<VecDeque<T>>,
}

impl<T: Deferred> PendingQueue<T> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: None,
        }
    }

    fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, VecDeque::len)
    }

    /// Queue `item`, or fail it with `RESOURCE_EXHAUSTED` when full.
    fn push(&mut self, item: T) {
        if self.capacity == 0 {
            item.fail(self.full());
            return;
        }
        let entries = self.entries.get_or_insert_with(VecDeque::new);
        if entries.len() >= self.capacity {
            warn!(capacity = self.capacity, "pending queue full, dropping newest message");
            item.fail(self.full());
            return;
        }
        entries.push_back(item);
    }

    /// Hand over everything queued, oldest first.
    fn take(&mut self) -> VecDeque<T> {
        self.entries.take().unwrap_or_default()
    }

    /// Fail entries that have waited at least `timeout`. Survivors keep their
    /// order. Returns the number of entries failed.
    fn evict_expired(&mut self, now: Instant, timeout: Duration) -> usize {
        let Some(entries) = self.entries.take() else {
            return 0;
        };
        let (expired, kept): (VecDeque<T>, VecDeque<T>) = entries
            .into_iter()
            .partition(|item| now.saturating_duration_since(item.received()) >= timeout);
        if !kept.is_empty() {
            self.entries = Some(kept);
        }
        let count = expired.len();
        for item in expired {
            item.fail(StrandMeshError::PendingExpired.into());
        }
        count
    }

    fn full(&self) -> Status {
        StrandMeshError::PendingQueueFull {
            capacity: self.capacity,
        }
        .into()
    }
}

/// A stream endpoint on this node: its handler once registered, and the
/// payloads that arrived before that.
struct StreamHolder {
    id: LocalStreamId,
    handler: Option<Arc<dyn StreamHandler>>,
    pending: PendingQueue<PendingStreamMessage>,
}

impl StreamHolder {
    fn new(id: LocalStreamId, capacity: usize) -> Self {
        Self {
            id,
            handler: None,
            pending: PendingQueue::new(capacity),
        }
    }

    fn handle_message(&mut self, seq: u64, received: Instant, payload: Bytes, done: StatusCallback) {
        match &self.handler {
            Some(handler) => handler.handle_message(seq, received, payload, done),
            None => {
                trace!(stream = %self.id, seq, "queueing message for unbound stream");
                self.pending.push(PendingStreamMessage {
                    seq,
                    received,
                    payload,
                    done,
                });
            }
        }
    }

    fn set_handler(&mut self, handler: Arc<dyn StreamHandler>) -> Result<()> {
        if self.handler.is_some() {
            return Err(StrandMeshError::HandlerAlreadySet {
                peer: self.id.peer,
                stream_id: self.id.stream_id,
            });
        }
        self.handler = Some(Arc::clone(&handler));
        let pending = self.pending.take();
        if !pending.is_empty() {
            debug!(stream = %self.id, count = pending.len(), "flushing queued messages to handler");
        }
        for p in pending {
            handler.handle_message(p.seq, p.received, p.payload, p.done);
        }
        Ok(())
    }
}

/// The route towards one remote peer: its link once known, and the
/// messages that arrived before that.
struct LinkHolder {
    peer: NodeId,
    link: Option<Arc<dyn Link>>,
    pending: PendingQueue<Message>,
}

impl LinkHolder {
    fn new(peer: NodeId, capacity: usize) -> Self {
        Self {
            peer,
            link: None,
            pending: PendingQueue::new(capacity),
        }
    }

    fn link(&self) -> Option<&Arc<dyn Link>> {
        self.link.as_ref()
    }

    fn forward(&mut self, message: Message) {
        match &self.link {
            Some(link) => link.forward(message),
            None => {
                trace!(peer = %self.peer, "queueing message for unlinked peer");
                self.pending.push(message);
            }
        }
    }

    fn set_link(&mut self, link: Arc<dyn Link>) {
        if let Some(previous) = &self.link {
            debug!(peer = %self.peer, from = previous.id(), to = link.id(), "rebinding link");
        }
        self.link = Some(Arc::clone(&link));
        let pending = self.pending.take();
        if !pending.is_empty() {
            debug!(peer = %self.peer, count = pending.len(), "flushing queued messages to link");
        }
        for message in pending {
            link.forward(message);
        }
    }
}

/// Whether two handles refer to the same link object. Only the data pointer
/// is compared; vtable pointers for one type can differ.
fn same_link(a: &Arc<dyn Link>, b: &Arc<dyn Link>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Routes messages for one node.
///
/// All methods take `&mut self`; callers serialize access. Handlers and
/// links are invoked synchronously from inside these methods and must not
/// call back into the same router.
pub struct Router {
    node_id: NodeId,
    config: RouterConfig,
    streams: HashMap<LocalStreamId, StreamHolder>,
    links: HashMap<NodeId, LinkHolder>,
}

impl Router {
    pub fn new(node_id: NodeId) -> Self {
        Self::with_config(node_id, RouterConfig::default())
    }

    pub fn with_config(node_id: NodeId, config: RouterConfig) -> Self {
        Self {
            node_id,
            config,
            streams: HashMap::new(),
            links: HashMap::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route `message` to every one of its destinations.
    ///
    /// The outcome is reported only through `message.done`: a message without
    /// destinations fails with `INVALID_ARGUMENT`, otherwise `done` settles
    /// once every destination has.
    pub fn forward(&mut self, message: Message) {
        let Message {
            wire,
            received,
            done,
        } = message;

        match wire.destinations.len() {
            0 => {
                warn!(src = %wire.src, "dropping message without destinations");
                done.call(StrandMeshError::NoDestinations.into());
            }
            1 => {
                let dst = wire.destinations[0];
                if dst.dst == self.node_id {
                    self.stream_holder(wire.src, dst.stream_id).handle_message(
                        dst.seq,
                        received,
                        wire.payload,
                        done,
                    );
                } else {
                    self.link_holder(dst.dst)
                        .forward(Message::new(wire, received, done));
                }
            }
            _ => self.multicast(wire, received, done),
        }
    }

    fn multicast(&mut self, wire: RoutableMessage, received: Instant, done: StatusCallback) {
        let join = Broadcast::new(done);
        let mut groups: Vec<(Arc<dyn Link>, Vec<Destination>)> = Vec::new();

        for dst in &wire.destinations {
            if dst.dst == self.node_id {
                let cb = join.add_callback();
                self.stream_holder(wire.src, dst.stream_id).handle_message(
                    dst.seq,
                    received,
                    wire.payload.clone(),
                    cb,
                );
                continue;
            }
            let holder = self.link_holder(dst.dst);
            match holder.link().cloned() {
                Some(link) => match groups.iter_mut().find(|(l, _)| same_link(l, &link)) {
                    Some((_, destinations)) => destinations.push(*dst),
                    None => groups.push((link, vec![*dst])),
                },
                None => {
                    let single = wire.with_destinations(vec![*dst]);
                    holder.forward(Message::new(single, received, join.add_callback()));
                }
            }
        }

        for (link, destinations) in groups {
            trace!(link = link.id(), count = destinations.len(), "forwarding grouped multicast");
            let grouped = wire.with_destinations(destinations);
            link.forward(Message::new(grouped, received, join.add_callback()));
        }
    }

    /// Bind the handler for stream `stream_id` sent by `peer`, flushing any
    /// messages that were waiting for it. A stream's handler can be set once.
    pub fn register_stream(
        &mut self,
        peer: NodeId,
        stream_id: StreamId,
        handler: Arc<dyn StreamHandler>,
    ) -> Result<()> {
        self.stream_holder(peer, stream_id).set_handler(handler)
    }

    /// Bind the link used to reach `peer`, flushing any messages that were
    /// waiting for it. Registering again replaces the previous link.
    pub fn register_link(&mut self, peer: NodeId, link: Arc<dyn Link>) {
        self.link_holder(peer).set_link(link);
    }

    /// Fail every queued message older than the configured timeout with
    /// `DEADLINE_EXCEEDED`. Returns the number of messages failed.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let Some(timeout) = self.config.pending_timeout else {
            return 0;
        };
        let mut count = 0;
        for holder in self.streams.values_mut() {
            count += holder.pending.evict_expired(now, timeout);
        }
        for holder in self.links.values_mut() {
            count += holder.pending.evict_expired(now, timeout);
        }
        if count > 0 {
            debug!(count, "evicted expired pending messages");
        }
        count
    }

    /// Messages waiting for a stream handler, across all streams.
    pub fn pending_stream_messages(&self) -> usize {
        self.streams.values().map(|h| h.pending.len()).sum()
    }

    /// Messages waiting for a link, across all peers.
    pub fn pending_link_messages(&self) -> usize {
        self.links.values().map(|h| h.pending.len()).sum()
    }

    fn stream_holder(&mut self, peer: NodeId, stream_id: StreamId) -> &mut StreamHolder {
        let capacity = self.config.max_pending_per_stream;
        let id = LocalStreamId::new(peer, stream_id);
        self.streams
            .entry(id)
            .or_insert_with(|| StreamHolder::new(id, capacity))
    }

    fn link_holder(&mut self, peer: NodeId) -> &mut LinkHolder {
        let capacity = self.config.max_pending_per_link;
        self.links
            .entry(peer)
            .or_insert_with(|| LinkHolder::new(peer, capacity))
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::status::StatusCode;

    struct Item {
        tag: u32,
        received: Instant,
        log: Arc<Mutex<Vec<(u32, StatusCode)>>>,
    }

    impl Deferred for Item {
        fn received(&self) -> Instant {
            self.received
        }

        fn fail(self, status: Status) {
            self.log.lock().push((self.tag, status.code()));
        }
    }

    #[test]
    fn queue_allocates_lazily_and_rejects_overflow() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let now = Instant::now();
        let mut queue = PendingQueue::new(2);
        assert!(queue.entries.is_none());

        for tag in 0..3 {
            queue.push(Item {
                tag,
                received: now,
                log: Arc::clone(&log),
            });
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(*log.lock(), vec![(2, StatusCode::ResourceExhausted)]);

        let drained: Vec<u32> = queue.take().into_iter().map(|i| i.tag).collect();
        assert_eq!(drained, vec![0, 1]);
        assert!(queue.entries.is_none());
    }

    #[test]
    fn storage_grows_with_use_not_capacity() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = PendingQueue::new(1 << 20);
        queue.push(Item {
            tag: 0,
            received: Instant::now(),
            log: Arc::clone(&log),
        });
        let allocated = queue.entries.as_ref().map_or(0, VecDeque::capacity);
        assert!(allocated >= 1 && allocated < 1024, "allocated {allocated}");
        assert!(log.lock().is_empty());
    }

    #[test]
    fn zero_capacity_fails_immediately() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = PendingQueue::new(0);
        queue.push(Item {
            tag: 9,
            received: Instant::now(),
            log: Arc::clone(&log),
        });
        assert_eq!(queue.len(), 0);
        assert_eq!(*log.lock(), vec![(9, StatusCode::ResourceExhausted)]);
    }

    #[test]
    fn eviction_keeps_survivor_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        let timeout = Duration::from_secs(10);
        let mut queue = PendingQueue::new(8);
        for (tag, offset) in [(0, 0), (1, 20), (2, 5), (3, 25)] {
            queue.push(Item {
                tag,
                received: start + Duration::from_secs(offset),
                log: Arc::clone(&log),
            });
        }

        let now = start + Duration::from_secs(20);
        assert_eq!(queue.evict_expired(now, timeout), 2);
        assert_eq!(
            *log.lock(),
            vec![
                (0, StatusCode::DeadlineExceeded),
                (2, StatusCode::DeadlineExceeded)
            ]
        );

        assert_eq!(queue.len(), 2);
        let rest: Vec<u32> = queue.take().into_iter().map(|i| i.tag).collect();
        assert_eq!(rest, vec![1, 3]);
    }

    #[test]
    fn eviction_frees_empty_queue() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        let mut queue = PendingQueue::new(4);
        queue.push(Item {
            tag: 0,
            received: start,
            log: Arc::clone(&log),
        });
        assert_eq!(
            queue.evict_expired(start + Duration::from_secs(1), Duration::from_secs(1)),
            1
        );
        assert!(queue.entries.is_none());
    }
}
