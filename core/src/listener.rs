//! Listener abstraction for lifecycle notifications.
//!
//! A [`Listener`] is registered with a notification hub and called once per
//! published event. Listeners are independent observers: audit logging,
//! metrics, e-mail hooks. The service that publishes never learns about
//! them, and a listener that fails never affects the publisher or any other
//! listener.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ 1. Validate     │
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ 2. Persist      │◄─── Repository write (source of truth)
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ 3. Publish      │◄─── Hub fans out in subscription order
//! └────────┬────────┘
//!     ┌────┴────┐
//!     ▼         ▼
//! ┌───────┐ ┌───────┐
//! │ Audit │ │Metrics│
//! └───────┘ └───────┘
//! ```
//!
//! # Example
//!
//! ```
//! use asset_lifecycle_core::listener::{FnListener, Listener, ListenerError};
//! use asset_lifecycle_core::event::{LifecycleEvent, RequestEvent};
//! use asset_lifecycle_core::ids::RequestId;
//!
//! let listener = FnListener::new("printer", |event: &RequestEvent| -> Result<(), ListenerError> {
//!     println!("{}", event.event_type());
//!     Ok(())
//! });
//! assert_eq!(Listener::<RequestEvent>::name(&listener), "printer");
//! assert!(listener.on_event(&RequestEvent::Deleted(RequestId::new(1))).is_ok());
//! ```

use std::fmt;
use thiserror::Error;

/// Errors a listener may report back to the hub.
///
/// The hub logs and counts these; it never propagates them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// The listener refused the event
    #[error("Listener '{listener}' rejected event: {reason}")]
    Rejected {
        /// Name of the listener
        listener: String,
        /// Why it refused
        reason: String,
    },

    /// A downstream sink (mail server, log file) was unavailable
    #[error("Listener sink unavailable: {0}")]
    Unavailable(String),

    /// Anything else
    #[error("Listener error: {0}")]
    Other(String),
}

/// Observer of one kind of lifecycle event.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the hub stores them behind `Arc`
/// and may call them from whichever task performs the publish.
///
/// # Identity
///
/// Hubs deduplicate subscriptions by `Arc` pointer, not by [`Listener::name`].
/// Two distinct instances with the same name are two listeners.
pub trait Listener<E>: Send + Sync {
    /// Name used in logs and metrics labels.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returning an error is reported by the hub and otherwise ignored.
    fn on_event(&self, event: &E) -> Result<(), ListenerError>;
}

/// Adapter turning a closure into a [`Listener`].
pub struct FnListener<F> {
    name: String,
    handler: F,
}

impl<F> FnListener<F> {
    /// Wrap `handler` under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> fmt::Debug for FnListener<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnListener")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<E, F> Listener<E> for FnListener<F>
where
    F: Fn(&E) -> Result<(), ListenerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, event: &E) -> Result<(), ListenerError> {
        (self.handler)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl Listener<u32> for Counting {
        fn on_event(&self, event: &u32) -> Result<(), ListenerError> {
            self.0.fetch_add(*event as usize, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn default_name_is_type_name() {
        let listener = Counting(AtomicUsize::new(0));
        assert!(Listener::<u32>::name(&listener).ends_with("Counting"));
    }

    #[test]
    fn fn_listener_forwards_to_closure() {
        let listener = FnListener::new("reject-odd", |n: &u32| -> Result<(), ListenerError> {
            if n % 2 == 1 {
                Err(ListenerError::Rejected {
                    listener: "reject-odd".to_string(),
                    reason: format!("{n} is odd"),
                })
            } else {
                Ok(())
            }
        });

        assert!(listener.on_event(&2).is_ok());
        let error = listener.on_event(&3).err();
        assert_eq!(
            error.map(|e| e.to_string()),
            Some("Listener 'reject-odd' rejected event: 3 is odd".to_string())
        );
    }

    #[test]
    fn fn_listener_debug_shows_name() {
        let listener = FnListener::new("audit", |_: &u32| Ok::<(), ListenerError>(()));
        assert!(format!("{listener:?}").contains("audit"));
    }
}
