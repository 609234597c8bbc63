//! Publish/subscribe registry for lifecycle events.
//!
//! One [`NotificationHub`] exists per event kind. Services publish after a
//! write has committed; the hub fans the event out to every listener in
//! subscription order and makes sure a misbehaving listener (error or panic)
//! cannot affect the publisher or the listeners after it.
//!
//! # Example
//!
//! ```
//! use asset_lifecycle_runtime::hub::NotificationHub;
//! use asset_lifecycle_core::listener::{FnListener, Listener, ListenerError};
//! use asset_lifecycle_core::{RequestEvent, RequestId};
//! use std::sync::Arc;
//!
//! let hub = NotificationHub::<RequestEvent>::new();
//! let listener: Arc<dyn Listener<RequestEvent>> =
//!     Arc::new(FnListener::new("noop", |_: &RequestEvent| Ok::<(), ListenerError>(())));
//!
//! assert!(hub.subscribe(Arc::clone(&listener)));
//! assert!(!hub.subscribe(Arc::clone(&listener))); // already registered
//!
//! let report = hub.publish(&RequestEvent::Deleted(RequestId::new(1)));
//! assert_eq!(report.delivered, 1);
//! assert!(report.is_clean());
//! ```

use asset_lifecycle_core::event::LifecycleEvent;
use asset_lifecycle_core::listener::Listener;
use asset_lifecycle_core::SmallVec;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

/// Outcome of one [`NotificationHub::publish`] call.
///
/// Informational only: the hub has already logged and counted every failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Listeners that handled the event
    pub delivered: usize,
    /// Names of listeners that returned an error or panicked
    pub failed: SmallVec<[String; 2]>,
}

impl DeliveryReport {
    /// Whether every listener handled the event.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of listeners the event was offered to.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// Ordered, deduplicated set of listeners for one event kind.
///
/// # Thread Safety
///
/// The listener list sits behind a `std::sync::RwLock`. `publish` clones the
/// list (cheap `Arc` clones) and releases the lock before calling anyone, so
/// listeners may subscribe or unsubscribe from inside `on_event` without
/// deadlocking. Such changes take effect from the next publish.
pub struct NotificationHub<E> {
    listeners: RwLock<Vec<Arc<dyn Listener<E>>>>,
}

impl<E> NotificationHub<E> {
    /// Create a hub with no listeners.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register `listener` at the end of the delivery order.
    ///
    /// Returns `false` without changing anything if this exact `Arc` is
    /// already registered.
    pub fn subscribe(&self, listener: Arc<dyn Listener<E>>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            tracing::debug!(listener = listener.name(), "Listener already subscribed");
            return false;
        }
        tracing::debug!(
            listener = listener.name(),
            position = listeners.len(),
            "Listener subscribed"
        );
        listeners.push(listener);
        true
    }

    /// Remove `listener`. Returns whether it was registered.
    pub fn unsubscribe(&self, listener: &Arc<dyn Listener<E>>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        let removed = listeners.len() != before;
        if removed {
            tracing::debug!(listener = listener.name(), "Listener unsubscribed");
        }
        removed
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Remove every listener.
    pub fn clear(&self) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(removed = listeners.len(), "Hub cleared");
        listeners.clear();
    }

    fn snapshot(&self) -> Vec<Arc<dyn Listener<E>>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<E: LifecycleEvent> NotificationHub<E> {
    /// Deliver `event` to every listener, in subscription order.
    ///
    /// A listener that returns an error or panics is logged at `warn`,
    /// counted in `hub_listener_failures_total` and skipped. Delivery always
    /// continues with the next listener and this method never fails.
    pub fn publish(&self, event: &E) -> DeliveryReport {
        let event_type = event.event_type();
        let listeners = self.snapshot();
        let mut report = DeliveryReport::default();

        metrics::counter!("hub_events_published_total", "event" => event_type).increment(1);

        for listener in &listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(error)) => {
                    tracing::warn!(
                        listener = listener.name(),
                        event = event_type,
                        error = %error,
                        "Listener failed"
                    );
                    record_failure(&mut report, listener.name());
                }
                Err(payload) => {
                    tracing::warn!(
                        listener = listener.name(),
                        event = event_type,
                        panic = panic_message(payload.as_ref()),
                        "Listener panicked"
                    );
                    record_failure(&mut report, listener.name());
                }
            }
        }

        tracing::trace!(
            event = event_type,
            delivered = report.delivered,
            failed = report.failed.len(),
            "Event published"
        );
        report
    }
}

impl<E> Default for NotificationHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for NotificationHub<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        f.debug_struct("NotificationHub")
            .field("listeners", &names)
            .finish()
    }
}

fn record_failure(report: &mut DeliveryReport, name: &str) {
    metrics::counter!("hub_listener_failures_total", "listener" => name.to_string()).increment(1);
    report.failed.push(name.to_string());
}

/// Identity is the data pointer; vtable pointers of the same object may differ
/// between codegen units.
fn same_listener<E>(a: &Arc<dyn Listener<E>>, b: &Arc<dyn Listener<E>>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_lifecycle_core::listener::{FnListener, ListenerError};
    use asset_lifecycle_core::{RequestEvent, RequestId};
    use asset_lifecycle_testing::{CallLog, FailingListener, PanickingListener, RecordingListener};

    fn event() -> RequestEvent {
        RequestEvent::Deleted(RequestId::new(1))
    }

    #[test]
    fn delivers_in_subscription_order() {
        let hub = NotificationHub::<RequestEvent>::new();
        let log = CallLog::new();
        hub.subscribe(log.probe("first"));
        hub.subscribe(log.probe("second"));
        hub.subscribe(log.probe("third"));

        let report = hub.publish(&event());

        assert_eq!(log.calls(), vec!["first", "second", "third"]);
        assert_eq!(report.delivered, 3);
    }

    #[test]
    fn error_and_panic_do_not_stop_delivery() {
        let hub = NotificationHub::<RequestEvent>::new();
        let log = CallLog::new();
        let failing = Arc::new(FailingListener::new("failing"));
        let panicking = Arc::new(PanickingListener::new("panicking"));

        hub.subscribe(log.probe("a"));
        hub.subscribe(failing.clone());
        hub.subscribe(log.probe("b"));
        hub.subscribe(panicking.clone());
        hub.subscribe(log.probe("c"));

        let report = hub.publish(&event());

        assert_eq!(log.calls(), vec!["a", "b", "c"]);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed.as_slice(), ["failing", "panicking"]);
        assert_eq!(report.attempted(), 5);
        assert_eq!(failing.calls(), 1);
        assert_eq!(panicking.calls(), 1);
    }

    #[test]
    fn unsubscribe_absent_listener_is_harmless() {
        let hub = NotificationHub::<RequestEvent>::new();
        let recorder: Arc<dyn Listener<RequestEvent>> = RecordingListener::shared("r");

        assert!(!hub.unsubscribe(&recorder));
        assert!(hub.subscribe(Arc::clone(&recorder)));
        assert!(hub.unsubscribe(&recorder));
        assert!(hub.is_empty());
    }

    #[test]
    fn distinct_instances_with_same_name_are_distinct_listeners() {
        let hub = NotificationHub::<RequestEvent>::new();
        assert!(hub.subscribe(RecordingListener::<RequestEvent>::shared("same")));
        assert!(hub.subscribe(RecordingListener::<RequestEvent>::shared("same")));
        assert_eq!(hub.count(), 2);

        hub.clear();
        assert_eq!(hub.count(), 0);
        assert_eq!(hub.publish(&event()).attempted(), 0);
    }

    #[test]
    fn listener_may_subscribe_during_delivery() {
        let hub = Arc::new(NotificationHub::<RequestEvent>::new());
        let late = RecordingListener::<RequestEvent>::shared("late");
        let inner_hub = Arc::clone(&hub);
        let inner_late = Arc::clone(&late);
        hub.subscribe(Arc::new(FnListener::new(
            "subscriber",
            move |_: &RequestEvent| -> Result<(), ListenerError> {
                inner_hub.subscribe(inner_late.clone());
                Ok(())
            },
        )));

        hub.publish(&event());
        assert!(late.is_empty());

        hub.publish(&event());
        assert_eq!(late.len(), 1);
    }
}
