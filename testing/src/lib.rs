//! # Voucher Testing
//!
//! Testing utilities for the voucher controllers.
//!
//! This crate provides:
//! - Deterministic clocks for the [`Clock`] trait
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Assertion helpers for effect descriptions
//!
//! ## Example
//!
//! ```ignore
//! use voucher_testing::{test_clock, ReducerTest};
//!
//! ReducerTest::new(RedemptionReducer::new())
//!     .with_env(test_environment())
//!     .given_state(viewing_state())
//!     .when_action(RedemptionAction::ItemTapped(Item::Carousel))
//!     .then_state(|state| assert_eq!(state.phase, RedemptionPhase::Armed(Item::Carousel)))
//!     .then_effects(assertions::assert_no_effects)
//!     .run();
//! ```

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;
use voucher_core::environment::Clock;

pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Duration, Mutex, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use voucher_testing::mocks::FixedClock;
    /// use voucher_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
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

    /// Clock that moves forward by a fixed step on every reading
    ///
    /// Useful when a test needs distinct, ordered timestamps, e.g. to check
    /// that a redemption time is never overwritten by a later one.
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// Create a clock starting at `start` and advancing by `step`
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable in tests
        fn now(&self) -> DateTime<Utc> {
            let mut next = self.next.lock().unwrap();
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// Create a default fixed clock for tests (2025-01-15 09:30:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }

    /// The instant returned by [`test_clock`]
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T09:30:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, test_time, FixedClock, SteppingClock};
pub use reducer_test::{assertions, ReducerTest};
