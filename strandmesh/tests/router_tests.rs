//! Router dispatch: local delivery, link forwarding, deferred binding and
//! multicast completion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use strandmesh::message::{Destination, Message, NodeId, RoutableMessage, StreamId};
use strandmesh::router::{Link, LinkId, Router, RouterConfig, StreamHandler};
use strandmesh::status::{Status, StatusCallback, StatusCode};
use strandmesh::StrandMeshError;

const LOCAL: NodeId = NodeId(1);
const PEER_A: NodeId = NodeId(2);
const PEER_B: NodeId = NodeId(3);
const PEER_C: NodeId = NodeId(4);

struct Delivered {
    seq: u64,
    received: Instant,
    payload: Bytes,
    done: StatusCallback,
}

/// Records deliveries and leaves their callbacks for the test to settle.
#[derive(Default)]
struct RecordingHandler {
    delivered: Mutex<Vec<Delivered>>,
}

impl StreamHandler for RecordingHandler {
    fn handle_message(&self, seq: u64, received: Instant, payload: Bytes, done: StatusCallback) {
        self.delivered.lock().push(Delivered {
            seq,
            received,
            payload,
            done,
        });
    }
}

impl RecordingHandler {
    fn seqs(&self) -> Vec<u64> {
        self.delivered.lock().iter().map(|d| d.seq).collect()
    }

    fn settle_all(&self, status: Status) {
        for d in self.delivered.lock().drain(..) {
            d.done.call(status.clone());
        }
    }
}

/// Records forwarded messages and leaves their callbacks for the test.
struct RecordingLink {
    id: LinkId,
    forwarded: Mutex<Vec<Message>>,
}

impl RecordingLink {
    fn new(id: LinkId) -> Arc<Self> {
        Arc::new(Self {
            id,
            forwarded: Mutex::new(Vec::new()),
        })
    }

    fn count(&self) -> usize {
        self.forwarded.lock().len()
    }

    fn destinations(&self, index: usize) -> Vec<NodeId> {
        self.forwarded.lock()[index]
            .wire
            .destinations
            .iter()
            .map(|d| d.dst)
            .collect()
    }

    fn settle(&self, index: usize, status: Status) {
        let message = self.forwarded.lock().remove(index);
        message.done.call(status);
    }
}

impl Link for RecordingLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn forward(&self, message: Message) {
        self.forwarded.lock().push(message);
    }
}

type StatusLog = Arc<Mutex<Vec<Status>>>;

fn done_recorder() -> (StatusLog, StatusCallback) {
    let log: StatusLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (log, StatusCallback::new(move |s| sink.lock().push(s)))
}

fn message(src: NodeId, destinations: Vec<Destination>, payload: &'static [u8]) -> RoutableMessage {
    RoutableMessage::new(src, destinations, Bytes::from_static(payload))
}

fn codes(log: &StatusLog) -> Vec<StatusCode> {
    log.lock().iter().map(Status::code).collect()
}

// ---------------------------------------------------------------------------
// Single destination
// ---------------------------------------------------------------------------

#[test]
fn zero_destinations_fails_done() {
    let mut router = Router::new(LOCAL);
    let handler = Arc::new(RecordingHandler::default());
    router
        .register_stream(PEER_A, StreamId(1), handler.clone())
        .unwrap();

    let (log, done) = done_recorder();
    router.forward(Message::new(message(PEER_A, vec![], b"x"), Instant::now(), done));

    assert_eq!(codes(&log), vec![StatusCode::InvalidArgument]);
    assert!(handler.seqs().is_empty());
    assert_eq!(router.pending_stream_messages(), 0);
    assert_eq!(router.pending_link_messages(), 0);
}

#[test]
fn local_message_goes_to_handler() {
    let mut router = Router::new(LOCAL);
    let handler = Arc::new(RecordingHandler::default());
    router
        .register_stream(PEER_A, StreamId(7), handler.clone())
        .unwrap();

    let (log, done) = done_recorder();
    let received = Instant::now();
    router.forward(Message::new(
        message(PEER_A, vec![Destination::new(LOCAL, StreamId(7), 3)], b"hello"),
        received,
        done,
    ));

    {
        let delivered = handler.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].seq, 3);
        assert_eq!(delivered[0].received, received);
        assert_eq!(delivered[0].payload, Bytes::from_static(b"hello"));
    }
    assert!(log.lock().is_empty());
    handler.settle_all(Status::ok());
    assert_eq!(codes(&log), vec![StatusCode::Ok]);
}

#[test]
fn streams_are_keyed_by_source_peer() {
    let mut router = Router::new(LOCAL);
    let from_a = Arc::new(RecordingHandler::default());
    let from_b = Arc::new(RecordingHandler::default());
    router
        .register_stream(PEER_A, StreamId(1), from_a.clone())
        .unwrap();
    router
        .register_stream(PEER_B, StreamId(1), from_b.clone())
        .unwrap();

    router.forward(Message::new(
        message(PEER_B, vec![Destination::new(LOCAL, StreamId(1), 9)], b"b"),
        Instant::now(),
        StatusCallback::ignore(),
    ));

    assert!(from_a.seqs().is_empty());
    assert_eq!(from_b.seqs(), vec![9]);
}

#[test]
fn queued_messages_flush_in_arrival_order() {
    let mut router = Router::new(LOCAL);
    let start = Instant::now();
    let mut logs = Vec::new();
    for seq in 1..=4u64 {
        let (log, done) = done_recorder();
        logs.push(log);
        router.forward(Message::new(
            message(PEER_A, vec![Destination::new(LOCAL, StreamId(2), seq)], b"p"),
            start + Duration::from_millis(seq),
            done,
        ));
    }
    assert_eq!(router.pending_stream_messages(), 4);

    let handler = Arc::new(RecordingHandler::default());
    router
        .register_stream(PEER_A, StreamId(2), handler.clone())
        .unwrap();
    assert_eq!(router.pending_stream_messages(), 0);
    assert_eq!(handler.seqs(), vec![1, 2, 3, 4]);
    {
        let delivered = handler.delivered.lock();
        for (i, d) in delivered.iter().enumerate() {
            assert_eq!(d.received, start + Duration::from_millis(i as u64 + 1));
        }
    }

    // Later traffic passes straight through.
    router.forward(Message::new(
        message(PEER_A, vec![Destination::new(LOCAL, StreamId(2), 5)], b"p"),
        Instant::now(),
        StatusCallback::ignore(),
    ));
    assert_eq!(handler.seqs(), vec![1, 2, 3, 4, 5]);

    handler.settle_all(Status::ok());
    for log in logs {
        assert_eq!(codes(&log), vec![StatusCode::Ok]);
    }
}

#[test]
fn second_handler_is_refused() {
    let mut router = Router::new(LOCAL);
    let first = Arc::new(RecordingHandler::default());
    let second = Arc::new(RecordingHandler::default());
    router
        .register_stream(PEER_A, StreamId(1), first.clone())
        .unwrap();

    let err = router
        .register_stream(PEER_A, StreamId(1), second.clone())
        .unwrap_err();
    assert!(matches!(
        err,
        StrandMeshError::HandlerAlreadySet {
            peer: PEER_A,
            stream_id: StreamId(1)
        }
    ));
    assert_eq!(
        Status::from(err).code(),
        StatusCode::FailedPrecondition
    );

    router.forward(Message::new(
        message(PEER_A, vec![Destination::new(LOCAL, StreamId(1), 1)], b"p"),
        Instant::now(),
        StatusCallback::ignore(),
    ));
    assert_eq!(first.seqs(), vec![1]);
    assert!(second.seqs().is_empty());
}

#[test]
fn remote_message_goes_to_link() {
    let mut router = Router::new(LOCAL);
    let link = RecordingLink::new(10);
    router.register_link(PEER_A, link.clone());

    let (log, done) = done_recorder();
    router.forward(Message::new(
        message(LOCAL, vec![Destination::new(PEER_A, StreamId(1), 1)], b"r"),
        Instant::now(),
        done,
    ));
    assert_eq!(link.count(), 1);
    link.settle(0, Status::from_code(StatusCode::Unavailable));
    assert_eq!(codes(&log), vec![StatusCode::Unavailable]);
}

#[test]
fn link_queue_flushes_on_register() {
    let mut router = Router::new(LOCAL);
    for seq in 1..=3u64 {
        router.forward(Message::new(
            message(LOCAL, vec![Destination::new(PEER_A, StreamId(1), seq)], b"r"),
            Instant::now(),
            StatusCallback::ignore(),
        ));
    }
    assert_eq!(router.pending_link_messages(), 3);

    let link = RecordingLink::new(1);
    router.register_link(PEER_A, link.clone());
    assert_eq!(router.pending_link_messages(), 0);
    let seqs: Vec<u64> = link
        .forwarded
        .lock()
        .iter()
        .map(|m| m.wire.destinations[0].seq)
        .collect();
    assert_eq!(seqs, vec![1, 2, 3]);
}

#[test]
fn link_can_be_rebound() {
    let mut router = Router::new(LOCAL);
    let old = RecordingLink::new(1);
    let new = RecordingLink::new(2);
    router.register_link(PEER_A, old.clone());
    router.register_link(PEER_A, new.clone());

    router.forward(Message::new(
        message(LOCAL, vec![Destination::new(PEER_A, StreamId(1), 1)], b"r"),
        Instant::now(),
        StatusCallback::ignore(),
    ));
    assert_eq!(old.count(), 0);
    assert_eq!(new.count(), 1);
}

// ---------------------------------------------------------------------------
// Multicast
// ---------------------------------------------------------------------------

fn multicast(destinations: &[NodeId]) -> RoutableMessage {
    message(
        LOCAL,
        destinations
            .iter()
            .enumerate()
            .map(|(i, dst)| Destination::new(*dst, StreamId(1), i as u64 + 1))
            .collect(),
        b"multi",
    )
}

#[test]
fn multicast_to_distinct_links() {
    let mut router = Router::new(LOCAL);
    let link_a = RecordingLink::new(1);
    let link_b = RecordingLink::new(2);
    router.register_link(PEER_A, link_a.clone());
    router.register_link(PEER_B, link_b.clone());

    let (log, done) = done_recorder();
    router.forward(Message::new(multicast(&[PEER_A, PEER_B]), Instant::now(), done));

    assert_eq!(link_a.count(), 1);
    assert_eq!(link_b.count(), 1);
    assert_eq!(link_a.destinations(0), vec![PEER_A]);
    assert_eq!(link_b.destinations(0), vec![PEER_B]);

    link_a.settle(0, Status::ok());
    assert!(log.lock().is_empty());
    link_b.settle(0, Status::ok());
    assert_eq!(codes(&log), vec![StatusCode::Ok]);
}

#[test]
fn multicast_regroups_destinations_sharing_a_link() {
    let mut router = Router::new(LOCAL);
    let shared = RecordingLink::new(7);
    router.register_link(PEER_A, shared.clone());
    router.register_link(PEER_B, shared.clone());

    let (log, done) = done_recorder();
    router.forward(Message::new(multicast(&[PEER_A, PEER_B]), Instant::now(), done));

    assert_eq!(shared.count(), 1);
    assert_eq!(shared.destinations(0), vec![PEER_A, PEER_B]);
    assert_eq!(
        shared.forwarded.lock()[0].wire.payload,
        Bytes::from_static(b"multi")
    );
    shared.settle(0, Status::ok());
    assert_eq!(codes(&log), vec![StatusCode::Ok]);
}

#[test]
fn multicast_keeps_distinct_links_with_equal_ids_apart() {
    let mut router = Router::new(LOCAL);
    let link_a = RecordingLink::new(5);
    let link_b = RecordingLink::new(5);
    router.register_link(PEER_A, link_a.clone());
    router.register_link(PEER_B, link_b.clone());

    let (log, done) = done_recorder();
    router.forward(Message::new(multicast(&[PEER_A, PEER_B]), Instant::now(), done));

    assert_eq!(link_a.count(), 1);
    assert_eq!(link_a.destinations(0), vec![PEER_A]);
    assert_eq!(link_b.count(), 1);
    assert_eq!(link_b.destinations(0), vec![PEER_B]);

    link_a.settle(0, Status::ok());
    assert!(codes(&log).is_empty());
    link_b.settle(0, Status::ok());
    assert_eq!(codes(&log), vec![StatusCode::Ok]);
}

#[test]
fn multicast_reports_first_failure_once() {
    let mut router = Router::new(LOCAL);
    let link_a = RecordingLink::new(1);
    let link_b = RecordingLink::new(2);
    let link_c = RecordingLink::new(3);
    router.register_link(PEER_A, link_a.clone());
    router.register_link(PEER_B, link_b.clone());
    router.register_link(PEER_C, link_c.clone());

    let (log, done) = done_recorder();
    router.forward(Message::new(
        multicast(&[PEER_A, PEER_B, PEER_C]),
        Instant::now(),
        done,
    ));

    link_b.settle(0, Status::new(StatusCode::Unavailable, "link down"));
    assert_eq!(codes(&log), vec![StatusCode::Unavailable]);
    assert_eq!(log.lock()[0].reason(), Some("link down"));

    link_a.settle(0, Status::ok());
    link_c.settle(0, Status::from_code(StatusCode::Internal));
    assert_eq!(codes(&log), vec![StatusCode::Unavailable]);
}

#[test]
fn multicast_mixes_local_and_unlinked_destinations() {
    let mut router = Router::new(LOCAL);
    let handler = Arc::new(RecordingHandler::default());
    router
        .register_stream(LOCAL, StreamId(1), handler.clone())
        .unwrap();
    let link_b = RecordingLink::new(2);
    router.register_link(PEER_B, link_b.clone());

    let (log, done) = done_recorder();
    router.forward(Message::new(
        multicast(&[LOCAL, PEER_A, PEER_B]),
        Instant::now(),
        done,
    ));

    // Local destination delivered, unlinked peer queued as a singleton.
    assert_eq!(handler.seqs(), vec![1]);
    assert_eq!(router.pending_link_messages(), 1);
    assert_eq!(link_b.count(), 1);

    let link_a = RecordingLink::new(1);
    router.register_link(PEER_A, link_a.clone());
    assert_eq!(link_a.count(), 1);
    assert_eq!(link_a.destinations(0), vec![PEER_A]);
    assert_eq!(link_a.forwarded.lock()[0].wire.destinations[0].seq, 2);

    handler.settle_all(Status::ok());
    link_b.settle(0, Status::ok());
    assert!(log.lock().is_empty());
    link_a.settle(0, Status::ok());
    assert_eq!(codes(&log), vec![StatusCode::Ok]);
}

#[test]
fn dropping_router_cancels_queued_work() {
    let mut router = Router::new(LOCAL);
    let (log, done) = done_recorder();
    router.forward(Message::new(
        multicast(&[PEER_A, PEER_B]),
        Instant::now(),
        done,
    ));
    assert_eq!(router.pending_link_messages(), 2);
    drop(router);
    assert_eq!(codes(&log), vec![StatusCode::Cancelled]);
}

// ---------------------------------------------------------------------------
// Bounded queues
// ---------------------------------------------------------------------------

#[test]
fn stream_queue_overflow_fails_newest() {
    let config = RouterConfig {
        max_pending_per_stream: 2,
        ..RouterConfig::default()
    };
    let mut router = Router::with_config(LOCAL, config);
    let mut logs = Vec::new();
    for seq in 1..=3u64 {
        let (log, done) = done_recorder();
        logs.push(log);
        router.forward(Message::new(
            message(PEER_A, vec![Destination::new(LOCAL, StreamId(1), seq)], b"p"),
            Instant::now(),
            done,
        ));
    }
    assert_eq!(router.pending_stream_messages(), 2);
    assert!(logs[0].lock().is_empty());
    assert!(logs[1].lock().is_empty());
    assert_eq!(codes(&logs[2]), vec![StatusCode::ResourceExhausted]);

    let handler = Arc::new(RecordingHandler::default());
    router
        .register_stream(PEER_A, StreamId(1), handler.clone())
        .unwrap();
    assert_eq!(handler.seqs(), vec![1, 2]);
}

#[test]
fn eviction_fails_expired_messages() {
    let config = RouterConfig {
        pending_timeout: Some(Duration::from_secs(5)),
        ..RouterConfig::default()
    };
    let mut router = Router::with_config(LOCAL, config);
    let start = Instant::now();

    let (old_stream, done) = done_recorder();
    router.forward(Message::new(
        message(PEER_A, vec![Destination::new(LOCAL, StreamId(1), 1)], b"p"),
        start,
        done,
    ));
    let (old_link, done) = done_recorder();
    router.forward(Message::new(
        message(LOCAL, vec![Destination::new(PEER_A, StreamId(1), 1)], b"p"),
        start,
        done,
    ));
    let (fresh, done) = done_recorder();
    router.forward(Message::new(
        message(PEER_A, vec![Destination::new(LOCAL, StreamId(1), 2)], b"p"),
        start + Duration::from_secs(4),
        done,
    ));

    assert_eq!(router.evict_expired(start + Duration::from_secs(6)), 2);
    assert_eq!(codes(&old_stream), vec![StatusCode::DeadlineExceeded]);
    assert_eq!(codes(&old_link), vec![StatusCode::DeadlineExceeded]);
    assert!(fresh.lock().is_empty());
    assert_eq!(router.pending_stream_messages(), 1);
    assert_eq!(router.pending_link_messages(), 0);
}

#[test]
fn eviction_disabled_without_timeout() {
    let config = RouterConfig {
        pending_timeout: None,
        ..RouterConfig::default()
    };
    let mut router = Router::with_config(LOCAL, config);
    let start = Instant::now();
    router.forward(Message::new(
        message(PEER_A, vec![Destination::new(LOCAL, StreamId(1), 1)], b"p"),
        start,
        StatusCallback::ignore(),
    ));
    assert_eq!(router.evict_expired(start + Duration::from_secs(3600)), 0);
    assert_eq!(router.pending_stream_messages(), 1);
}
