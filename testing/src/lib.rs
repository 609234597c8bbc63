//! # Asset Lifecycle Testing
//!
//! Testing utilities for the device request/allocation lifecycle.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`SteppingClock`])
//! - In-memory implementations of the repository and device contracts, with
//!   fault injection and a hook for reproducing the allocate race
//! - Listener probes that record, fail or panic on delivery
//! - [`LifecycleHarness`], which wires all of the above into the services
//!
//! ## Example
//!
//! ```
//! use asset_lifecycle_testing::LifecycleHarness;
//! use asset_lifecycle_core::RequestStatus;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let harness = LifecycleHarness::new();
//!
//! let request = harness.lifecycle.create_request("D1", "E7", Some("broken laptop")).await?;
//! harness.lifecycle.approve(request.id).await?;
//! harness.manager.allocate(request.id).await?;
//!
//! let stored = harness.lifecycle.get(request.id).await?;
//! assert_eq!(stored.status, RequestStatus::Allocated);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};
use asset_lifecycle_core::environment::Clock;

/// In-memory repositories and device registry
pub mod repositories;

/// Listener probes
pub mod listeners;

/// Fully wired services over in-memory collaborators
pub mod harness;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use asset_lifecycle_testing::mocks::FixedClock;
    /// use asset_lifecycle_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that advances by a fixed step on every reading.
    ///
    /// Lets lifecycle tests assert strict ordering (`issued_at < returned_at`)
    /// without sleeping.
    ///
    /// # Example
    ///
    /// ```
    /// use asset_lifecycle_testing::mocks::SteppingClock;
    /// use asset_lifecycle_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = SteppingClock::new(Utc::now(), Duration::minutes(1));
    /// let first = clock.now();
    /// let second = clock.now();
    /// assert_eq!(second - first, Duration::minutes(1));
    /// ```
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` after each reading
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }

        /// The time the next call to `now()` will return
        #[must_use]
        pub fn peek(&self) -> DateTime<Utc> {
            *self
                .next
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }

        /// Jump forward without producing a reading
        pub fn advance(&self, by: Duration) {
            let mut next = self
                .next
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *next += by;
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut next = self
                .next
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let now = *next;
            *next += self.step;
            now
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// A stepping clock starting at the test epoch, one minute per reading
    #[must_use]
    pub fn stepping_clock() -> SteppingClock {
        SteppingClock::new(test_epoch(), Duration::minutes(1))
    }

    /// 2025-01-01 00:00:00 UTC
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

// Re-export commonly used items
pub use harness::{LifecycleHarness, init_test_tracing};
pub use listeners::{CallLog, CallProbe, FailingListener, PanickingListener, RecordingListener};
pub use mocks::{FixedClock, SteppingClock, stepping_clock, test_clock, test_epoch};
pub use repositories::{
    InMemoryAllocationRepository, InMemoryDeviceRegistry, InMemoryRequestRepository,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn stepping_clock_advances_per_reading() {
        let clock = stepping_clock();
        let first = clock.now();
        clock.advance(Duration::hours(1));
        let second = clock.now();
        assert_eq!(first, test_epoch());
        assert_eq!(second - first, Duration::minutes(61));
        assert_eq!(clock.peek() - second, Duration::minutes(1));
    }
}
