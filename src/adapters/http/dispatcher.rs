//! Detached delivery dispatch.
//!
//! Each admitted delivery runs the handler on its own task so the HTTP
//! response never waits on it. Errors and panics stop at this boundary.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::domain::Delivery;
use crate::ports::DeliveryHandler;

/// Spawns handler invocations and tracks them for draining.
#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn DeliveryHandler>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn DeliveryHandler>) -> Self {
        Self {
            handler,
            tracker: TaskTracker::new(),
        }
    }

    /// Hands `delivery` to the handler on a new task and returns immediately.
    pub fn dispatch(&self, delivery: Delivery) {
        let handler = Arc::clone(&self.handler);
        let span = tracing::info_span!(
            "dispatch",
            event_type = %delivery.event_type,
            delivery_id = %delivery.delivery_id,
        );

        self.tracker.spawn(
            async move {
                match AssertUnwindSafe(handler.handle(delivery)).catch_unwind().await {
                    Ok(Ok(())) => tracing::debug!("Handler finished"),
                    Ok(Err(e)) => tracing::error!(error = %e, "Handler failed"),
                    Err(panic) => {
                        tracing::error!(panic = %panic_message(&*panic), "Handler panicked")
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Handlers still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stops accepting work and waits up to `grace` for running handlers.
    ///
    /// Returns `false` if handlers were still running at the deadline; they
    /// are left to finish or be dropped with the runtime.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    in_flight = self.tracker.len(),
                    grace_secs = grace.as_secs(),
                    "Handlers still running after grace period, abandoning"
                );
                false
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
