//! Post-commit, in-process event fan-out.
//!
//! After a save commits, the service hands the newly stored events to the
//! [`EventPublisher`], which delivers them to every registered
//! [`EventListener`] that accepts the event's kind. Publication is
//! best-effort and strictly after the events are durable: a failing listener
//! is recorded and isolated, never propagated, and can roll nothing back. A
//! crash between commit and publish leaves the events committed but not yet
//! propagated - that is delivery latency, not a write failure.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::store::StoredEvent;

/// Boxed error a listener may return.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A consumer of committed events.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Name used when recording failures.
    fn name(&self) -> &str;

    /// Whether this listener accepts events of `kind`.
    fn wants(&self, kind: &str) -> bool;

    /// Handle one committed event.
    ///
    /// # Errors
    ///
    /// Errors are recorded by the publisher and do not affect delivery to
    /// other listeners or to subsequent events.
    async fn on_event(&self, event: &StoredEvent) -> Result<(), ListenerError>;
}

/// Counts from one [`EventPublisher::publish`] call.
///
/// Failures were already recorded when this is returned; the counts exist
/// for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Deliveries that succeeded.
    pub delivered: usize,
    /// Deliveries that failed and were isolated.
    pub failed: usize,
}

/// Fan-out of committed events to registered listeners.
#[derive(Default)]
pub struct EventPublisher {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Takes effect for subsequent publish calls.
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.listeners
            .write()
            .expect("publisher listener lock poisoned")
            .push(listener);
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .expect("publisher listener lock poisoned")
            .len()
    }

    /// Deliver `events`, in order, to every listener whose
    /// [`wants`](EventListener::wants) accepts the event's kind.
    ///
    /// A failing listener does not abort delivery to other listeners or to
    /// later events; each failure is logged at `warn` and counted. An event
    /// with no matching listener is skipped silently.
    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    pub async fn publish(&self, events: &[StoredEvent]) -> PublishSummary {
        let listeners: Vec<Arc<dyn EventListener>> = self
            .listeners
            .read()
            .expect("publisher listener lock poisoned")
            .clone();

        let mut summary = PublishSummary::default();
        for event in events {
            for listener in &listeners {
                if !listener.wants(&event.kind) {
                    continue;
                }
                match listener.on_event(event).await {
                    Ok(()) => summary.delivered += 1,
                    Err(error) => {
                        summary.failed += 1;
                        tracing::warn!(
                            listener = listener.name(),
                            event_id = %event.event_id,
                            kind = %event.kind,
                            error = %error,
                            "listener failed; continuing delivery"
                        );
                    }
                }
            }
        }
        summary
    }
}
