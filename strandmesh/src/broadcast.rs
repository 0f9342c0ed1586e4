//! Completion join for multi-destination messages.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::status::{Status, StatusCallback};

struct Shared {
    done: Mutex<Option<StatusCallback>>,
}

impl Shared {
    fn fail(&self, status: Status) {
        // Take the callback out before invoking it so it never runs under the lock.
        let done = self.done.lock().take();
        if let Some(done) = done {
            done.call(status);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(done) = self.done.get_mut().take() {
            done.call(Status::ok());
        }
    }
}

/// Joins the per-destination completions of one message back into its
/// original `done` callback.
///
/// The join itself holds a reference until it is dropped, so `done` cannot
/// fire `OK` while destinations are still being added. The first non-OK
/// status fires `done` immediately; later statuses are discarded. If every
/// destination succeeds, `done` fires `OK` when the last reference goes.
pub(crate) struct Broadcast {
    shared: Arc<Shared>,
}

impl Broadcast {
    pub(crate) fn new(done: StatusCallback) -> Self {
        Self {
            shared: Arc::new(Shared {
                done: Mutex::new(Some(done)),
            }),
        }
    }

    /// A callback for one more destination.
    pub(crate) fn add_callback(&self) -> StatusCallback {
        let shared = Arc::clone(&self.shared);
        StatusCallback::new(move |status: Status| {
            if !status.is_ok() {
                shared.fail(status);
            }
        })
    }
}
