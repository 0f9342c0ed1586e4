//! Receive-side stream: gates inbound payloads through a receive mode.
//!
//! A [`ReceiveStream`] is registered with the router as the handler for one
//! stream. Each payload is announced to the stream's receive mode with
//! `begin`; only once the mode releases it is the payload passed to the
//! application sink. The sink's completion is reported back to the mode,
//! which may release parked payloads, and then to the router's `done`.
//!
//! Mode callbacks can fire synchronously from inside `begin` or `completed`,
//! and a sink can complete synchronously from inside `handle_message`. To
//! keep the mode from being re-entered while it is borrowed, released work
//! is pushed onto a ready queue and dispatched outside the mode lock by
//! whichever caller gets there first.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::ack_frame::AckFrame;
use crate::receive_mode::{ParameterizedReceiveMode, ReceiveMode, ReliabilityAndOrdering};
use crate::router::StreamHandler;
use crate::status::{Status, StatusCallback};

/// Work released by the receive mode, waiting to be dispatched.
struct Ready {
    seq: u64,
    received: Instant,
    payload: Bytes,
    done: StatusCallback,
    status: Status,
}

#[derive(Default)]
struct ReadyQueue {
    items: VecDeque<Ready>,
    draining: bool,
}

struct Shared {
    mode: Mutex<ParameterizedReceiveMode>,
    ready: Mutex<ReadyQueue>,
    sink: Arc<dyn StreamHandler>,
}

/// A stream handler that applies a receive mode before delivering to `sink`.
#[derive(Clone)]
pub struct ReceiveStream {
    shared: Arc<Shared>,
}

impl ReceiveStream {
    pub fn new(mode: impl Into<ParameterizedReceiveMode>, sink: Arc<dyn StreamHandler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                mode: Mutex::new(mode.into()),
                ready: Mutex::new(ReadyQueue::default()),
                sink,
            }),
        }
    }

    /// Build from a raw reliability tag; unknown tags refuse every payload.
    pub fn from_wire(tag: u8, sink: Arc<dyn StreamHandler>) -> Self {
        Self::new(ParameterizedReceiveMode::from_wire(tag), sink)
    }

    /// The stream's policy, or `None` if its tag was invalid.
    pub fn mode(&self) -> Option<ReliabilityAndOrdering> {
        self.shared.mode.lock().mode()
    }

    /// The acknowledgement to send back to the stream's source.
    pub fn generate_ack(&self) -> AckFrame {
        self.shared.mode.lock().generate_ack()
    }
}

impl StreamHandler for ReceiveStream {
    fn handle_message(&self, seq: u64, received: Instant, payload: Bytes, done: StatusCallback) {
        let weak = Arc::downgrade(&self.shared);
        let ready = StatusCallback::new(move |status: Status| {
            let entry = Ready {
                seq,
                received,
                payload,
                done,
                status,
            };
            match weak.upgrade() {
                Some(shared) => shared.ready.lock().items.push_back(entry),
                // The stream is being torn down.
                None => entry.done.call(Status::cancelled()),
            }
        });

        let accepted = self.shared.mode.lock().begin(seq, ready);
        if !accepted {
            debug!(seq, "receive mode rejected sequence number");
        }
        drain(&self.shared);
    }
}

/// Dispatch everything on the ready queue. Nested calls return immediately
/// and leave the work to the outermost one.
fn drain(shared: &Arc<Shared>) {
    {
        let mut queue = shared.ready.lock();
        if queue.draining {
            return;
        }
        queue.draining = true;
    }
    loop {
        let next = {
            let mut queue = shared.ready.lock();
            match queue.items.pop_front() {
                Some(entry) => entry,
                None => {
                    queue.draining = false;
                    return;
                }
            }
        };
        dispatch(shared, next);
    }
}

fn dispatch(shared: &Arc<Shared>, entry: Ready) {
    let Ready {
        seq,
        received,
        payload,
        done,
        status,
    } = entry;

    if !status.is_ok() {
        trace!(seq, %status, "payload not delivered");
        done.call(status);
        return;
    }

    let weak: Weak<Shared> = Arc::downgrade(shared);
    let completion = StatusCallback::new(move |status: Status| match weak.upgrade() {
        Some(shared) => {
            shared.mode.lock().completed(seq, &status);
            done.call(status);
            drain(&shared);
        }
        None => done.call(status),
    });
    shared.sink.handle_message(seq, received, payload, completion);
}
