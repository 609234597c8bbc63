//! In-memory audit trail of lifecycle events.
//!
//! [`AuditTrail`] is a listener for both hubs. Each event becomes an
//! [`AuditEntry`] holding its versioned type, entity id, the time it was
//! recorded and the full event as JSON.
//!
//! # Features
//!
//! - Bounded ring with configurable capacity
//! - FIFO ordering (oldest entries dropped when full)
//! - Thread-safe for concurrent publishers
//!
//! # Example
//!
//! ```
//! use asset_lifecycle_runtime::audit::AuditTrail;
//! use asset_lifecycle_core::environment::SystemClock;
//! use asset_lifecycle_core::listener::Listener;
//! use asset_lifecycle_core::{RequestEvent, RequestId};
//! use std::sync::Arc;
//!
//! let trail = AuditTrail::new(100, Arc::new(SystemClock));
//! trail.on_event(&RequestEvent::Deleted(RequestId::new(4))).unwrap();
//!
//! let entries = trail.entries();
//! assert_eq!(entries[0].event_type, "RequestDeleted.v1");
//! assert_eq!(entries[0].entity_id, 4);
//! ```

use asset_lifecycle_core::environment::Clock;
use asset_lifecycle_core::event::LifecycleEvent;
use asset_lifecycle_core::listener::{Listener, ListenerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Versioned event type, e.g. `"RequestApproved.v1"`
    pub event_type: String,
    /// Raw id of the request or allocation
    pub entity_id: u64,
    /// When the trail received the event
    pub recorded_at: DateTime<Utc>,
    /// The event itself
    pub payload: serde_json::Value,
}

/// Bounded audit log fed by the notification hubs.
pub struct AuditTrail {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl AuditTrail {
    /// Create an empty trail keeping at most `capacity` entries.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            clock,
        }
    }

    /// Copy of the retained entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the trail is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return all entries.
    pub fn drain(&self) -> Vec<AuditEntry> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let drained: Vec<_> = entries.drain(..).collect();
        tracing::info!(count = drained.len(), "Drained audit trail");
        drained
    }

    /// Maximum number of retained entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn record(&self, entry: AuditEntry) {
        tracing::info!(
            event = %entry.event_type,
            entity_id = entry.entity_id,
            "Audit"
        );

        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity {
            entries.pop_front();
            tracing::warn!(
                capacity = self.capacity,
                "Audit trail at capacity, dropping oldest entry"
            );
        }
        entries.push_back(entry);
    }
}

impl fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditTrail")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<E> Listener<E> for AuditTrail
where
    E: LifecycleEvent + Serialize,
{
    fn name(&self) -> &str {
        "audit-trail"
    }

    fn on_event(&self, event: &E) -> Result<(), ListenerError> {
        let payload = event
            .to_json()
            .map_err(|e| ListenerError::Other(e.to_string()))?;
        self.record(AuditEntry {
            event_type: event.event_type().to_string(),
            entity_id: event.entity_id(),
            recorded_at: self.clock.now(),
            payload,
        });
        Ok(())
    }
}
