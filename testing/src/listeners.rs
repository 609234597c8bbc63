//! Listener probes for hub and service tests.
//!
//! - [`RecordingListener`] keeps a copy of every event it receives
//! - [`FailingListener`] returns an error on every delivery
//! - [`PanickingListener`] panics on every delivery
//! - [`CallLog`] hands out named probes that append to one shared log, for
//!   asserting delivery order across listeners

use asset_lifecycle_core::event::LifecycleEvent;
use asset_lifecycle_core::listener::{Listener, ListenerError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Captures every event it receives, in delivery order.
///
/// # Example
///
/// ```
/// use asset_lifecycle_testing::RecordingListener;
/// use asset_lifecycle_core::listener::Listener;
/// use asset_lifecycle_core::{RequestEvent, RequestId};
///
/// let recorder = RecordingListener::<RequestEvent>::new("recorder");
/// recorder.on_event(&RequestEvent::Deleted(RequestId::new(1))).unwrap();
///
/// assert_eq!(recorder.event_types(), vec!["RequestDeleted.v1"]);
/// ```
#[derive(Debug)]
pub struct RecordingListener<E> {
    name: String,
    events: Mutex<Vec<E>>,
}

impl<E: Clone> RecordingListener<E> {
    /// Create an empty recorder
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Create an empty recorder behind an `Arc`, ready to subscribe
    #[must_use]
    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    /// Copy of the events received so far
    #[must_use]
    pub fn events(&self) -> Vec<E> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events received
    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been received
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything received so far
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl<E: LifecycleEvent> RecordingListener<E> {
    /// Versioned type of each event received, in order
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(LifecycleEvent::event_type)
            .collect()
    }
}

impl<E: Clone + Send + Sync> Listener<E> for RecordingListener<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, event: &E) -> Result<(), ListenerError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// Rejects every event and counts how often it was called.
#[derive(Debug)]
pub struct FailingListener {
    name: String,
    calls: AtomicUsize,
}

impl FailingListener {
    /// Create a failing listener
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of deliveries attempted
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<E> Listener<E> for FailingListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, _event: &E) -> Result<(), ListenerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ListenerError::Unavailable(format!(
            "{} is configured to fail",
            self.name
        )))
    }
}

/// Panics on every event.
#[derive(Debug)]
pub struct PanickingListener {
    name: String,
    calls: AtomicUsize,
}

impl PanickingListener {
    /// Create a panicking listener
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of deliveries attempted
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<E> Listener<E> for PanickingListener {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::panic)] // Panicking is the point of this probe
    fn on_event(&self, _event: &E) -> Result<(), ListenerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("{} panicked on purpose", self.name);
    }
}

/// Shared log of which listener was called, in call order.
///
/// # Example
///
/// ```
/// use asset_lifecycle_testing::CallLog;
/// use asset_lifecycle_core::listener::Listener;
///
/// let log = CallLog::new();
/// let a = log.probe("a");
/// let b = log.probe("b");
/// Listener::<u8>::on_event(&*b, &0).unwrap();
/// Listener::<u8>::on_event(&*a, &0).unwrap();
///
/// assert_eq!(log.calls(), vec!["b", "a"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A listener that appends `name` to this log on every event
    #[must_use]
    pub fn probe(&self, name: &str) -> Arc<CallProbe> {
        Arc::new(CallProbe {
            name: name.to_string(),
            log: self.clone(),
        })
    }

    /// Names recorded so far, in call order
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Listener handed out by [`CallLog::probe`].
#[derive(Debug)]
pub struct CallProbe {
    name: String,
    log: CallLog,
}

impl<E> Listener<E> for CallProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, _event: &E) -> Result<(), ListenerError> {
        self.log
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.name.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_listener_counts_calls() {
        let listener = FailingListener::new("mailer");
        assert!(Listener::<u8>::on_event(&listener, &1).is_err());
        assert!(Listener::<u8>::on_event(&listener, &2).is_err());
        assert_eq!(listener.calls(), 2);
    }

    #[test]
    fn recorder_clear_forgets_events() {
        let recorder = RecordingListener::<u8>::new("r");
        assert!(recorder.on_event(&3).is_ok());
        assert_eq!(recorder.events(), vec![3]);
        recorder.clear();
        assert!(recorder.is_empty());
    }
}
