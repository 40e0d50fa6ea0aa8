//! Notification Bus
//!
//! In-process publish/subscribe for claim events. Dispatch is synchronous
//! and at-most-once per registered handler; handlers for one event kind run
//! in subscription order. Nothing is persisted; a crash between publish
//! and handler execution loses the notification, which is acceptable for
//! this single-process core.
//!
//! The bus is constructed once and passed by `Arc` to the orchestrator and
//! any observers; there is no process-wide singleton, so tests build
//! isolated instances. The registry is read-mostly (subscriptions happen at
//! startup) and supports concurrent publishes from independent in-flight
//! claims.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::types::{ClaimEvent, ClaimEventKind};

/// Synchronous event handler.
pub type EventHandler = Arc<dyn Fn(&ClaimEvent) + Send + Sync>;

/// In-process notification bus.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<ClaimEventKind, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind. Handlers are invoked in
    /// subscription order.
    pub fn subscribe<F>(&self, kind: ClaimEventKind, handler: F)
    where
        F: Fn(&ClaimEvent) + Send + Sync + 'static,
    {
        match self.subscribers.write() {
            Ok(mut subscribers) => {
                subscribers.entry(kind).or_default().push(Arc::new(handler));
            }
            Err(_) => warn!("Event bus registry poisoned, subscription dropped"),
        }
    }

    /// Publish an event to all current subscribers of its kind
    /// (fire-and-forget).
    ///
    /// Every published event is also logged as a serializable audit record
    /// for external observability consumers.
    pub fn publish(&self, event: &ClaimEvent) {
        match serde_json::to_string(event) {
            Ok(json) => debug!(
                kind = %event.kind(),
                claim_id = %event.claim_id(),
                payload = %json,
                "Event published"
            ),
            Err(e) => warn!(kind = %event.kind(), error = %e, "Event not serializable"),
        }

        // Snapshot the handler list so no lock is held while handlers run.
        let handlers: Vec<EventHandler> = match self.subscribers.read() {
            Ok(subscribers) => subscribers
                .get(&event.kind())
                .map(|h| h.to_vec())
                .unwrap_or_default(),
            Err(_) => {
                warn!("Event bus registry poisoned, event dropped");
                return;
            }
        };

        for handler in handlers {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClaimId, RejectionReason, RoutingDestination};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let order = Arc::clone(&order);
            bus.subscribe(ClaimEventKind::Rejected, move |_| {
                order.lock().unwrap().push(tag);
            });
        }

        bus.publish(&ClaimEvent::rejected(
            ClaimId::new(),
            RejectionReason::PolicyNotFound,
        ));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn handlers_only_see_their_kind() {
        let bus = EventBus::new();
        let rejected_seen = Arc::new(AtomicUsize::new(0));
        let routed_seen = Arc::new(AtomicUsize::new(0));

        {
            let seen = Arc::clone(&rejected_seen);
            bus.subscribe(ClaimEventKind::Rejected, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let seen = Arc::clone(&routed_seen);
            bus.subscribe(ClaimEventKind::Routed, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish(&ClaimEvent::routed(
            ClaimId::new(),
            RoutingDestination::AutomatedProcessing,
        ));
        assert_eq!(rejected_seen.load(Ordering::SeqCst), 0);
        assert_eq!(routed_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_publishes_all_deliver() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(AtomicUsize::new(0));
        {
            let seen = Arc::clone(&seen);
            bus.subscribe(ClaimEventKind::Rejected, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let bus = Arc::clone(&bus);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        bus.publish(&ClaimEvent::rejected(
                            ClaimId::new(),
                            RejectionReason::PolicyInactive,
                        ));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(seen.load(Ordering::SeqCst), 400);
    }
}
