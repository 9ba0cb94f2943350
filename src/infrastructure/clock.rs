//! Real time: `Instant::now` for reading, `thread::sleep` for waiting.
//!
//! Tests use `mocks::MockClock` instead, which advances on `sleep`.

use crate::application::ports::{Clock, Sleeper};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl Sleeper for SystemClock {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sleep_returns_immediately() {
        let clock = SystemClock::new();
        let start = clock.now();
        clock.sleep(Duration::ZERO);
        assert!(clock.now() - start < Duration::from_millis(5));
    }

    #[test]
    fn test_system_sleep_blocks() {
        let clock = SystemClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_millis(20));
        assert!(clock.now() - start >= Duration::from_millis(20));
    }
}
