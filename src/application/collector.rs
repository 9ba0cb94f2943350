//! Metrics collection facade.
//!
//! `MetricsCollector` records request and performance metrics into a
//! [`MetricsAggregator`], keeps named counters, times operations and notifies
//! subscribers. Subscriber failures are caught and logged; they never reach
//! the code that recorded the metric.

use crate::application::aggregator::{MetricsAggregator, DEFAULT_WINDOW_SIZE};
use crate::application::counters::CounterRegistry;
use crate::application::ports::Clock;
use crate::application::{read, write};
use crate::domain::counter_key::CounterKey;
use crate::domain::error::ConfigError;
use crate::domain::metric::{
    Context, CounterMetric, MetricEvent, PerformanceMetric, RequestDetails, RequestMetric,
};
use crate::domain::stats::{PerformanceStats, RequestStats};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::storage::ShardedStorage;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Subscriber invoked after every recorded request or performance metric.
pub type MetricCallback = Arc<dyn Fn(&MetricEvent) + Send + Sync + 'static>;

type CounterStorage = Arc<ShardedStorage<CounterKey, CounterMetric>>;

/// Combined view of aggregated metrics and counters at one instant.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StatsSnapshot {
    /// When the snapshot was taken
    pub timestamp: SystemTime,
    pub window: Option<Duration>,
    /// Absent when the collector was built without aggregation
    pub requests: Option<RequestStats>,
    /// Absent when the collector was built without aggregation
    pub performance: Option<PerformanceStats>,
    pub counters: BTreeMap<String, CounterMetric>,
}

/// Stopwatch reading time from a [`Clock`].
#[derive(Debug, Clone)]
pub struct Timer {
    clock: Arc<dyn Clock>,
    started_at: Instant,
    stopped_at: Option<Instant>,
}

impl Timer {
    /// Start a timer on the system clock.
    pub fn start() -> Self {
        Self::start_with(Arc::new(SystemClock::new()))
    }

    pub fn start_with(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            started_at,
            stopped_at: None,
        }
    }

    /// Stop the timer and return the elapsed milliseconds.
    ///
    /// Stopping twice keeps the first reading.
    pub fn stop(&mut self) -> f64 {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(self.clock.now());
        }
        self.elapsed_ms()
    }

    /// Milliseconds since start, up to the stop time if stopped.
    pub fn elapsed_ms(&self) -> f64 {
        let end = self.stopped_at.unwrap_or_else(|| self.clock.now());
        end.saturating_duration_since(self.started_at).as_secs_f64() * 1000.0
    }

    pub fn is_running(&self) -> bool {
        self.stopped_at.is_none()
    }
}

/// Guard that records one performance metric when it goes out of scope.
///
/// Returned by [`MetricsCollector::time_operation`]. The metric is recorded
/// exactly once, on [`finish`](Self::finish) or on drop, including drops
/// during unwinding.
#[must_use = "the operation is timed until this guard is dropped"]
pub struct OperationTimer {
    collector: MetricsCollector,
    operation: String,
    context: Context,
    timer: Timer,
    recorded: bool,
}

impl OperationTimer {
    /// Add a context entry to the metric that will be recorded.
    pub fn add_context(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context.insert(key.into(), value.into());
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.timer.elapsed_ms()
    }

    /// Stop timing now and return the recorded metric.
    pub fn finish(mut self) -> Option<PerformanceMetric> {
        self.record()
    }

    fn record(&mut self) -> Option<PerformanceMetric> {
        if self.recorded {
            return None;
        }
        self.recorded = true;
        let duration_ms = self.timer.stop();
        let context = std::mem::take(&mut self.context);
        let operation = std::mem::take(&mut self.operation);
        Some(
            self.collector
                .record_performance(operation, duration_ms, context),
        )
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.record();
    }
}

impl fmt::Debug for OperationTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationTimer")
            .field("operation", &self.operation)
            .field("elapsed_ms", &self.timer.elapsed_ms())
            .field("recorded", &self.recorded)
            .finish()
    }
}

struct CollectorInner {
    aggregator: Option<MetricsAggregator>,
    counters: CounterRegistry<CounterStorage>,
    callbacks: RwLock<Vec<MetricCallback>>,
    clock: Arc<dyn Clock>,
}

/// Records metrics, maintains counters and notifies subscribers.
///
/// Cloning is cheap and every clone shares the same state.
///
/// # Example
/// ```
/// use crm_resilience::MetricsCollector;
///
/// let collector = MetricsCollector::new(1000).unwrap();
///
/// collector.record_request("GET", "Contact", Some(200), Some(35.0));
/// collector.increment_counter("api_calls", 1, [("entity", "Contact")]);
///
/// {
///     let _timer = collector.time_operation("load_metadata", Default::default());
///     // ... work ...
/// }
///
/// let stats = collector.get_stats(None);
/// assert_eq!(stats.requests.unwrap().total, 1);
/// assert_eq!(stats.performance.unwrap().total, 1);
/// assert_eq!(stats.counters["api_calls{entity=Contact}"].value, 1);
/// ```
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<CollectorInner>,
}

impl MetricsCollector {
    /// Collector aggregating the last `window_size` metrics of each kind.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroCapacity` if `window_size` is zero.
    pub fn new(window_size: usize) -> Result<Self, ConfigError> {
        Self::with_clock(window_size, Arc::new(SystemClock::new()))
    }

    /// Collector reading time from `clock`.
    pub fn with_clock(window_size: usize, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let aggregator = MetricsAggregator::with_clock(window_size, Arc::clone(&clock))?;
        Ok(Self::from_parts(Some(aggregator), clock))
    }

    /// Collector that keeps counters and notifies subscribers but retains no
    /// request or performance history.
    pub fn without_aggregation() -> Self {
        Self::from_parts(None, Arc::new(SystemClock::new()))
    }

    fn from_parts(aggregator: Option<MetricsAggregator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                aggregator,
                counters: CounterRegistry::new(Arc::new(ShardedStorage::new())),
                callbacks: RwLock::new(Vec::new()),
                clock,
            }),
        }
    }

    /// Record a request outcome.
    pub fn record_request(
        &self,
        method: impl Into<String>,
        endpoint: impl Into<String>,
        status_code: Option<u16>,
        latency_ms: Option<f64>,
    ) -> RequestMetric {
        let mut details = RequestDetails::new(method, endpoint);
        details.status_code = status_code;
        details.latency_ms = latency_ms;
        self.record_request_details(details)
    }

    /// Record a request outcome with every optional field available.
    pub fn record_request_details(&self, details: RequestDetails) -> RequestMetric {
        let metric = RequestMetric::new(details, self.inner.clock.now());

        if let Some(aggregator) = &self.inner.aggregator {
            aggregator.add_request(metric.clone());
        }

        info!(
            method = %metric.method,
            endpoint = %metric.endpoint,
            status_code = ?metric.status_code,
            latency_ms = ?metric.latency_ms,
            request_id = ?metric.request_id,
            "API request recorded"
        );

        self.notify(MetricEvent::Request(metric.clone()));
        metric
    }

    /// Record the duration of a named operation.
    pub fn record_performance(
        &self,
        operation: impl Into<String>,
        duration_ms: f64,
        context: Context,
    ) -> PerformanceMetric {
        let metric = PerformanceMetric::new(operation, duration_ms, context, self.inner.clock.now());

        if let Some(aggregator) = &self.inner.aggregator {
            aggregator.add_performance(metric.clone());
        }

        info!(
            operation = %metric.operation,
            duration_ms = metric.duration_ms,
            "Performance metric recorded"
        );

        self.notify(MetricEvent::Performance(metric.clone()));
        metric
    }

    /// Get a counter, creating it at zero if it does not exist yet.
    pub fn counter<I, K, V>(&self, name: impl Into<String>, labels: I) -> CounterMetric
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.inner
            .counters
            .get_or_create(CounterKey::new(name, labels))
    }

    /// Add `amount` to a counter and return its new value.
    pub fn increment_counter<I, K, V>(&self, name: impl Into<String>, amount: u64, labels: I) -> u64
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let key = CounterKey::new(name, labels);
        let counter = self.inner.counters.increment(key, amount);
        debug!(
            counter = %counter.name,
            amount,
            value = counter.value,
            "Counter incremented"
        );
        counter.value
    }

    /// Start a timer on the collector's clock.
    pub fn create_timer(&self) -> Timer {
        Timer::start_with(Arc::clone(&self.inner.clock))
    }

    /// Time an operation until the returned guard is finished or dropped.
    pub fn time_operation(&self, operation: impl Into<String>, context: Context) -> OperationTimer {
        OperationTimer {
            collector: self.clone(),
            operation: operation.into(),
            context,
            timer: self.create_timer(),
            recorded: false,
        }
    }

    /// Run `f`, recording its duration as a performance metric.
    ///
    /// The metric is recorded even if `f` panics.
    pub fn time<T, F>(&self, operation: impl Into<String>, context: Context, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let guard = self.time_operation(operation, context);
        let result = f();
        guard.finish();
        result
    }

    /// Register a subscriber for newly recorded metrics.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: Fn(&MetricEvent) + Send + Sync + 'static,
    {
        write(&self.inner.callbacks).push(Arc::new(callback));
    }

    pub fn callback_count(&self) -> usize {
        read(&self.inner.callbacks).len()
    }

    pub fn clear_callbacks(&self) {
        write(&self.inner.callbacks).clear();
    }

    /// Invoke every subscriber, isolating each from the others' panics.
    fn notify(&self, event: MetricEvent) {
        // Snapshot so subscribers may register further callbacks
        let callbacks: Vec<MetricCallback> = read(&self.inner.callbacks).clone();

        for (index, callback) in callbacks.iter().enumerate() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(&event)));
            if let Err(payload) = result {
                error!(
                    callback = index,
                    metric = event.kind(),
                    panic = panic_message(payload.as_ref()),
                    "Metric callback panicked"
                );
            }
        }
    }

    /// Aggregated stats plus counter values, stamped with the query time.
    pub fn get_stats(&self, window: Option<Duration>) -> StatsSnapshot {
        let aggregator = self.inner.aggregator.as_ref();
        StatsSnapshot {
            timestamp: SystemTime::now(),
            window,
            requests: aggregator.map(|a| a.request_stats(window)),
            performance: aggregator.map(|a| a.performance_stats(window)),
            counters: self.inner.counters.snapshot(),
        }
    }

    /// Discard retained metrics and counters. Subscribers stay registered.
    pub fn reset(&self) {
        if let Some(aggregator) = &self.inner.aggregator {
            aggregator.clear();
        }
        self.inner.counters.clear();
        info!("Metrics collector reset");
    }

    pub fn aggregator(&self) -> Option<&MetricsAggregator> {
        self.inner.aggregator.as_ref()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE).unwrap_or_else(|_| Self::without_aggregation())
    }
}

impl fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("aggregator", &self.inner.aggregator)
            .field("counters", &self.inner.counters.len())
            .field("callbacks", &self.callback_count())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
