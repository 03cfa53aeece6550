//! In-process publish/subscribe for queue lifecycle events.
//!
//! Dispatch is synchronous and ordered by registration. A handler that
//! returns an error (or panics) is logged and skipped; the remaining
//! handlers still run and nothing propagates out of `publish`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::{EventKind, QueueEvent};

/// Error a handler may return. Only logged.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<dyn Fn(&QueueEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Returned by `subscribe`, used to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    /// `None` receives every event.
    filter: Option<EventKind>,
    handler: Handler,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&QueueEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.insert(Some(kind), Arc::new(handler))
    }

    /// Register a handler for every event kind.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&QueueEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(handler))
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Invoke every matching handler in registration order.
    pub fn publish(&self, event: &QueueEvent) {
        let kind = event.kind();

        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .lock()
            .iter()
            .filter(|s| s.filter.is_none_or(|k| k == kind))
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(subscription = id.0, event = ?kind, error = %e, "event handler failed");
                }
                Err(panic_info) => {
                    let panic_msg = panic_message(panic_info.as_ref());
                    tracing::error!(subscription = id.0, event = ?kind, panic_msg = %panic_msg, "event handler panicked");
                }
            }
        }
    }

    fn insert(&self, filter: Option<EventKind>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscription {
            id,
            filter,
            handler,
        });
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(bus: &EventBus, kind: EventKind, tag: &'static str, log: &Arc<Mutex<Vec<String>>>) {
        let log = Arc::clone(log);
        bus.subscribe(kind, move |_| {
            log.lock().unwrap().push(tag.to_string());
            Ok(())
        });
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&bus, EventKind::QueueEmpty, "first", &log);
        recorder(&bus, EventKind::QueueEmpty, "second", &log);
        recorder(&bus, EventKind::QueueEmpty, "third", &log);

        bus.publish(&QueueEvent::QueueEmpty);

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn only_matching_kind_is_invoked() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&bus, EventKind::ItemAdded, "added", &log);
        recorder(&bus, EventKind::QueueEmpty, "empty", &log);

        bus.publish(&QueueEvent::QueueEmpty);

        assert_eq!(*log.lock().unwrap(), vec!["empty"]);
    }

    #[test]
    fn failing_and_panicking_handlers_do_not_stop_dispatch() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(EventKind::QueueEmpty, |_| Err("handler refused".into()));
        bus.subscribe(EventKind::QueueEmpty, |_| panic!("handler blew up"));
        recorder(&bus, EventKind::QueueEmpty, "survivor", &log);

        bus.publish(&QueueEvent::QueueEmpty);

        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }

    #[test]
    fn unsubscribe_removes_handler() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = Arc::clone(&log);
        let id = bus.subscribe(EventKind::QueueEmpty, move |_| {
            log2.lock().unwrap().push("gone".to_string());
            Ok(())
        });

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&QueueEvent::QueueEmpty);

        assert!(log.lock().unwrap().is_empty());
        assert!(bus.lock().is_empty());
    }

    #[test]
    fn subscribe_all_sees_every_kind() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = Arc::clone(&log);
        bus.subscribe_all(move |event| {
            log2.lock().unwrap().push(format!("{:?}", event.kind()));
            Ok(())
        });

        bus.publish(&QueueEvent::QueueEmpty);
        bus.publish(&QueueEvent::PersistenceFailed {
            key: "k".to_string(),
            message: "m".to_string(),
        });

        assert_eq!(*log.lock().unwrap(), vec!["QueueEmpty", "PersistenceFailed"]);
    }
}
