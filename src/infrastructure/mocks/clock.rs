//! Manually driven clock that doubles as a recording sleeper.

use crate::application::lock;
use crate::application::ports::{Clock, Sleeper};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time only moves when a test says so. Used as a [`Sleeper`], every sleep
/// advances the clock by the requested duration and is recorded, so code that
/// waits can be tested without waiting.
///
/// # Examples
///
/// ```
/// use crm_resilience::infrastructure::mocks::MockClock;
/// use crm_resilience::{Clock, Sleeper};
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let clock = MockClock::new(start);
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), start + Duration::from_secs(10));
///
/// clock.sleep(Duration::from_secs(5));
/// assert_eq!(clock.now(), start + Duration::from_secs(15));
/// assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
/// ```
///
/// Clones share the same time and sleep log.
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<Instant>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl MockClock {
    pub fn new(start: Instant) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        *lock(&self.current_time) += duration;
    }

    pub fn set(&self, instant: Instant) {
        *lock(&self.current_time) = instant;
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }

    /// Sum of all recorded sleeps.
    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *lock(&self.current_time)
    }
}

impl Sleeper for MockClock {
    fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
        self.advance(duration);
    }
}
