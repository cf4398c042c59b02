//! Time source abstraction.
//!
//! Entry validity and the assignment status policy both compare against
//! "now". Routing every read of the current time through [`Clock`] lets
//! production code use the wall clock while tests advance a simulated clock
//! without sleeping.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Debug + Send + Sync + 'static {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Shared, type-erased clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Returns a shared handle to the system clock.
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(feature = "test-helpers")]
pub use mock::MockClock;

#[cfg(feature = "test-helpers")]
mod mock {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;

    use super::Clock;

    /// Manually driven clock for deterministic tests.
    ///
    /// Clones share the same time, so a clock handed to a cache can be
    /// advanced from the test body.
    ///
    /// ```
    /// use std::time::Duration;
    /// use wardcache_core::{Clock, MockClock};
    ///
    /// let clock = MockClock::new();
    /// let start = clock.now();
    /// clock.advance(Duration::from_secs(5));
    /// assert_eq!((clock.now() - start).num_seconds(), 5);
    /// ```
    #[derive(Debug, Clone)]
    pub struct MockClock {
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    impl MockClock {
        /// Creates a clock frozen at the current wall-clock time.
        pub fn new() -> Self {
            Self::at(Utc::now())
        }

        /// Creates a clock frozen at `now`.
        pub fn at(now: DateTime<Utc>) -> Self {
            Self {
                now: Arc::new(Mutex::new(now)),
            }
        }

        /// Moves the clock forward.
        pub fn advance(&self, by: Duration) {
            let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
            let mut now = self.now.lock();
            *now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
        }

        /// Sets the clock to an absolute instant.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.now.lock() = to;
        }
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock()
        }
    }
}
