//! Bounded-window statistical rollups.
//!
//! The aggregator keeps the most recent request and performance metrics in
//! two fixed-capacity rings guarded by one mutex. Insertion is O(1); stats
//! are computed on demand over at most the ring capacity.

use crate::application::lock;
use crate::application::ports::Clock;
use crate::domain::error::ConfigError;
use crate::domain::metric::{PerformanceMetric, RequestMetric};
use crate::domain::stats::{PerformanceStats, RequestStats};
use crate::domain::window::MetricWindow;
use crate::infrastructure::clock::SystemClock;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default ring capacity per metric kind.
pub const DEFAULT_WINDOW_SIZE: usize = 1000;

#[derive(Debug)]
struct Rings {
    requests: MetricWindow<RequestMetric>,
    performance: MetricWindow<PerformanceMetric>,
}

fn within(recorded_at: Instant, now: Instant, window: Option<Duration>) -> bool {
    match window {
        Some(window) => now.saturating_duration_since(recorded_at) <= window,
        None => true,
    }
}

/// Rolling store of recent metrics with on-demand statistics.
///
/// # Example
/// ```
/// use crm_resilience::{MetricsAggregator, RequestDetails, RequestMetric};
/// use std::time::Instant;
///
/// let aggregator = MetricsAggregator::new(100).unwrap();
/// for status in [200, 200, 404, 500] {
///     let details = RequestDetails::new("GET", "Account").with_status(status);
///     aggregator.add_request(RequestMetric::new(details, Instant::now()));
/// }
///
/// let stats = aggregator.request_stats(None);
/// assert_eq!(stats.total, 4);
/// assert_eq!(stats.successful, 2);
/// assert_eq!(stats.success_rate, 0.5);
/// ```
pub struct MetricsAggregator {
    rings: Mutex<Rings>,
    clock: Arc<dyn Clock>,
}

impl MetricsAggregator {
    /// Aggregator keeping `window_size` records of each kind.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroCapacity` if `window_size` is zero.
    pub fn new(window_size: usize) -> Result<Self, ConfigError> {
        Self::with_clock(window_size, Arc::new(SystemClock::new()))
    }

    /// Aggregator that filters time windows against `clock`.
    pub fn with_clock(window_size: usize, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        Ok(Self {
            rings: Mutex::new(Rings {
                requests: MetricWindow::new(window_size)?,
                performance: MetricWindow::new(window_size)?,
            }),
            clock,
        })
    }

    /// Store a request metric, evicting the oldest one if the ring is full.
    pub fn add_request(&self, metric: RequestMetric) {
        lock(&self.rings).requests.push(metric);
    }

    /// Store a performance metric, evicting the oldest one if the ring is full.
    pub fn add_performance(&self, metric: PerformanceMetric) {
        lock(&self.rings).performance.push(metric);
    }

    /// Request statistics, optionally restricted to the trailing `window`.
    pub fn request_stats(&self, window: Option<Duration>) -> RequestStats {
        let now = self.clock.now();
        let rings = lock(&self.rings);
        RequestStats::compute(
            rings
                .requests
                .iter()
                .filter(|m| within(m.recorded_at, now, window)),
            window,
        )
    }

    /// Performance statistics, optionally restricted to the trailing `window`.
    pub fn performance_stats(&self, window: Option<Duration>) -> PerformanceStats {
        let now = self.clock.now();
        let rings = lock(&self.rings);
        PerformanceStats::compute(
            rings
                .performance
                .iter()
                .filter(|m| within(m.recorded_at, now, window)),
            window,
        )
    }

    /// Copy of the retained request metrics, oldest first.
    pub fn requests(&self) -> Vec<RequestMetric> {
        lock(&self.rings).requests.iter().cloned().collect()
    }

    /// Copy of the retained performance metrics, oldest first.
    pub fn performance(&self) -> Vec<PerformanceMetric> {
        lock(&self.rings).performance.iter().cloned().collect()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.rings).requests.len()
    }

    pub fn performance_count(&self) -> usize {
        lock(&self.rings).performance.len()
    }

    /// Ring capacity shared by both metric kinds.
    pub fn window_size(&self) -> usize {
        lock(&self.rings).requests.capacity()
    }

    /// Discard every retained record.
    pub fn clear(&self) {
        let mut rings = lock(&self.rings);
        rings.requests.clear();
        rings.performance.clear();
    }
}

impl fmt::Debug for MetricsAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rings = lock(&self.rings);
        f.debug_struct("MetricsAggregator")
            .field("window_size", &rings.requests.capacity())
            .field("requests", &rings.requests.len())
            .field("performance", &rings.performance.len())
            .finish()
    }
}
