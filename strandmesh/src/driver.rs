//! Background maintenance for a router shared between tasks.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

use crate::router::Router;

/// A router shared between tasks.
pub type SharedRouter = Arc<Mutex<Router>>;

/// Run [`Router::evict_expired`] every `period` until the router is dropped.
///
/// The task only holds a weak reference, so it exits on the first tick after
/// the last `SharedRouter` goes away. Expired messages' callbacks run while
/// the router lock is held and must not lock it again.
pub fn spawn_eviction(router: &SharedRouter, period: Duration) -> JoinHandle<()> {
    let weak = Arc::downgrade(router);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(router) = weak.upgrade() else {
                trace!("router dropped, stopping eviction");
                return;
            };
            let now = Instant::now().into_std();
            router.lock().evict_expired(now);
        }
    })
}
