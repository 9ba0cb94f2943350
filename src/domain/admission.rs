//! Sliding-window admission decisions.
//!
//! Keeps the timestamps of granted admissions within the trailing window.
//! The window slides continuously, so bursts are spread out instead of being
//! allowed in full at each window boundary.

use crate::domain::error::ConfigError;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Result of asking the window for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call is within the limit and has been recorded
    Granted,
    /// The window is full; retry after this long
    Wait(Duration),
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted)
    }
}

/// Rolling set of admission timestamps.
///
/// # Example
/// ```
/// use crm_resilience::{Admission, AdmissionWindow};
/// use std::time::{Duration, Instant};
///
/// let mut window = AdmissionWindow::new(2, Duration::from_secs(60)).unwrap();
/// let start = Instant::now();
///
/// assert!(window.try_admit(start).is_granted());
/// assert!(window.try_admit(start + Duration::from_secs(10)).is_granted());
///
/// // Full: the oldest grant leaves the window 60s after it was made
/// let third = start + Duration::from_secs(20);
/// assert_eq!(window.try_admit(third), Admission::Wait(Duration::from_secs(40)));
///
/// assert!(window.try_admit(start + Duration::from_secs(60)).is_granted());
/// ```
#[derive(Debug, Clone)]
pub struct AdmissionWindow {
    limit: usize,
    window: Duration,
    granted: VecDeque<Instant>,
}

impl AdmissionWindow {
    /// Create a window allowing `limit` grants per `window`.
    ///
    /// # Errors
    /// `ConfigError::ZeroCapacity` for a zero limit, `ConfigError::ZeroWindow`
    /// for a zero duration.
    pub fn new(limit: usize, window: Duration) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self {
            limit,
            window,
            granted: VecDeque::with_capacity(limit),
        })
    }

    /// Drop grants whose age has reached the window length.
    fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.granted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.granted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Grant admission at `now`, or report how long until a slot frees up.
    pub fn try_admit(&mut self, now: Instant) -> Admission {
        self.expire(now);

        if self.granted.len() < self.limit {
            self.granted.push_back(now);
            return Admission::Granted;
        }

        match self.granted.front() {
            Some(&oldest) => {
                let age = now.saturating_duration_since(oldest);
                Admission::Wait(self.window.saturating_sub(age))
            }
            None => Admission::Wait(self.window),
        }
    }

    /// Number of grants younger than the window at `now`.
    pub fn in_window(&self, now: Instant) -> usize {
        self.granted
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.window)
            .count()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn reset(&mut self) {
        self.granted.clear();
    }
}
