//! Sliding-window admission control.
//!
//! A `RateGate` blocks callers until their call fits within the configured
//! number of grants per trailing window (60 seconds by default). A gate built
//! without a limit admits everything immediately.

use crate::application::lock;
use crate::application::ports::{Clock, Sleeper};
use crate::domain::admission::{Admission, AdmissionWindow};
use crate::domain::error::ConfigError;
use crate::infrastructure::clock::SystemClock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Default sliding window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Largest accepted per-window limit.
pub const MAX_RATE_LIMIT: i64 = 10_000;

/// Validate a raw limit as it appears in configuration.
///
/// `None` and zero disable the gate. Negative values and values above
/// [`MAX_RATE_LIMIT`] are rejected.
pub fn validate_limit(limit: Option<i64>) -> Result<Option<usize>, ConfigError> {
    match limit {
        None | Some(0) => Ok(None),
        Some(n) if !(1..=MAX_RATE_LIMIT).contains(&n) => Err(ConfigError::InvalidRateLimit(n)),
        Some(n) => usize::try_from(n)
            .map(Some)
            .map_err(|_| ConfigError::InvalidRateLimit(n)),
    }
}

/// Counters describing how a gate has behaved so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateGateStats {
    /// Calls that were admitted
    pub granted: u64,
    /// Calls that had to wait at least once before being admitted
    pub throttled: u64,
    /// Sum of all waits
    pub total_wait: Duration,
}

#[derive(Debug, Default)]
struct GateCounters {
    granted: AtomicU64,
    throttled: AtomicU64,
    wait_nanos: AtomicU64,
}

impl GateCounters {
    fn record_wait(&self, wait: Duration) {
        let nanos = u64::try_from(wait.as_nanos()).unwrap_or(u64::MAX);
        self.wait_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

/// Builder for a [`RateGate`].
pub struct RateGateBuilder {
    limit: Option<i64>,
    window: Duration,
    clock: Option<Arc<dyn Clock>>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl RateGateBuilder {
    /// Maximum grants per window. `None` or zero disables the gate.
    pub fn with_limit(mut self, limit: Option<i64>) -> Self {
        self.limit = limit;
        self
    }

    /// Length of the sliding window.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Read time from a custom clock (useful for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Block through a custom sleeper (useful for testing).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Build the gate.
    ///
    /// # Errors
    /// `ConfigError::InvalidRateLimit` for a negative or oversized limit,
    /// `ConfigError::ZeroWindow` for an empty window.
    pub fn build(self) -> Result<RateGate, ConfigError> {
        let window = match validate_limit(self.limit)? {
            Some(limit) => Some(Mutex::new(AdmissionWindow::new(limit, self.window)?)),
            None if self.window.is_zero() => return Err(ConfigError::ZeroWindow),
            None => None,
        };

        Ok(RateGate {
            window,
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(SystemClock::new())),
            sleeper: self
                .sleeper
                .unwrap_or_else(|| Arc::new(SystemClock::new())),
            counters: GateCounters::default(),
        })
    }
}

/// Blocking sliding-window rate limiter.
///
/// Every admission decision is made under one mutex, so a gate shared by many
/// threads never grants more than `limit` calls in any trailing window. The
/// lock is released while a caller sleeps; after waking the caller competes
/// for a slot again, so waiters are not served in strict FIFO order.
///
/// # Example
/// ```
/// use crm_resilience::RateGate;
///
/// let gate = RateGate::new(Some(100)).unwrap();
/// gate.admit();
/// assert_eq!(gate.in_window(), 1);
///
/// let open = RateGate::new(None).unwrap();
/// assert!(!open.is_enabled());
/// ```
pub struct RateGate {
    window: Option<Mutex<AdmissionWindow>>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    counters: GateCounters,
}

impl RateGate {
    /// Gate allowing `limit` calls per minute, backed by the system clock.
    pub fn new(limit: Option<i64>) -> Result<Self, ConfigError> {
        Self::builder().with_limit(limit).build()
    }

    /// Gate that admits every call immediately.
    pub fn disabled() -> Self {
        RateGate {
            window: None,
            clock: Arc::new(SystemClock::new()),
            sleeper: Arc::new(SystemClock::new()),
            counters: GateCounters::default(),
        }
    }

    pub fn builder() -> RateGateBuilder {
        RateGateBuilder {
            limit: None,
            window: DEFAULT_WINDOW,
            clock: None,
            sleeper: None,
        }
    }

    /// Ask for a slot once, without blocking.
    fn try_admit(&self, window: &Mutex<AdmissionWindow>) -> Admission {
        let now = self.clock.now();
        lock(window).try_admit(now)
    }

    /// Block until the call fits in the window, then record it.
    pub fn admit(&self) {
        let Some(window) = &self.window else {
            self.counters.granted.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let mut waited = false;
        loop {
            match self.try_admit(window) {
                Admission::Granted => break,
                Admission::Wait(wait) => {
                    self.on_throttled(wait, &mut waited);
                    self.sleeper.sleep(wait);
                }
            }
        }
        self.counters.granted.fetch_add(1, Ordering::Relaxed);
    }

    /// Async variant of [`admit`](Self::admit), sleeping on the tokio timer.
    ///
    /// The window lock is never held across an await point.
    #[cfg(feature = "async")]
    pub async fn admit_async(&self) {
        let Some(window) = &self.window else {
            self.counters.granted.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let mut waited = false;
        loop {
            let decision = self.try_admit(window);
            match decision {
                Admission::Granted => break,
                Admission::Wait(wait) => {
                    self.on_throttled(wait, &mut waited);
                    tokio::time::sleep(wait).await;
                }
            }
        }
        self.counters.granted.fetch_add(1, Ordering::Relaxed);
    }

    fn on_throttled(&self, wait: Duration, waited: &mut bool) {
        if !*waited {
            self.counters.throttled.fetch_add(1, Ordering::Relaxed);
            *waited = true;
        }
        self.counters.record_wait(wait);
        warn!(
            wait_ms = wait.as_millis() as u64,
            limit = self.limit().unwrap_or_default(),
            "Rate limit reached, waiting for a free slot"
        );
    }

    pub fn is_enabled(&self) -> bool {
        self.window.is_some()
    }

    /// Grants allowed per window, `None` when disabled.
    pub fn limit(&self) -> Option<usize> {
        self.window.as_ref().map(|w| lock(w).limit())
    }

    pub fn window(&self) -> Option<Duration> {
        self.window.as_ref().map(|w| lock(w).window())
    }

    /// Grants still inside the trailing window.
    pub fn in_window(&self) -> usize {
        match &self.window {
            Some(window) => lock(window).in_window(self.clock.now()),
            None => 0,
        }
    }

    pub fn stats(&self) -> RateGateStats {
        RateGateStats {
            granted: self.counters.granted.load(Ordering::Relaxed),
            throttled: self.counters.throttled.load(Ordering::Relaxed),
            total_wait: Duration::from_nanos(self.counters.wait_nanos.load(Ordering::Relaxed)),
        }
    }

    /// Forget all grants, leaving the limit unchanged.
    pub fn reset(&self) {
        if let Some(window) = &self.window {
            lock(window).reset();
        }
    }
}

impl fmt::Debug for RateGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateGate")
            .field("limit", &self.limit())
            .field("window", &self.window())
            .field("stats", &self.stats())
            .finish()
    }
}
