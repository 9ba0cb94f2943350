//! Per-level log counters.
//!
//! The log-side counterpart of `MetricsCollector`: counts emitted log records
//! by level, counts errors per target, summarizes the durations some records
//! carry and notifies alert subscribers about severe records. Fed by
//! `LogMetricsLayer`, or directly through [`LogMetrics::record_log`].

use crate::application::collector::panic_message;
use crate::application::{lock, read, write};
use crate::domain::error::ConfigError;
use crate::domain::stats::DurationSummary;
use crate::domain::window::MetricWindow;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{error, Level};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Target of the events this module emits.
pub(crate) const LOG_METRICS_TARGET: &str = module_path!();

/// Number of recent durations kept for the summary.
pub const DEFAULT_DURATION_SAMPLES: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// Log statistics at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct LogStats {
    pub total: u64,
    pub errors: u64,
    pub warnings: u64,
    /// Count per level name (`"ERROR"`, `"WARN"`, `"INFO"`, ...)
    pub by_level: BTreeMap<String, u64>,
    /// ERROR records per target
    pub by_target_errors: BTreeMap<String, u64>,
    pub error_rate: f64,
    /// Absent until a record carrying a duration is seen
    pub duration: Option<DurationSummary>,
}

#[derive(Debug)]
struct LogMetricsState {
    total: u64,
    errors: u64,
    warnings: u64,
    by_level: BTreeMap<String, u64>,
    by_target_errors: BTreeMap<String, u64>,
    durations: MetricWindow<f64>,
}

/// A record severe enough to reach an alert subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct LogAlert {
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// Alert subscriber signature.
pub type AlertCallback = Arc<dyn Fn(&LogAlert) + Send + Sync + 'static>;

#[derive(Clone)]
struct AlertSubscriber {
    threshold: Level,
    callback: AlertCallback,
}

impl AlertSubscriber {
    // `Level` orders verbose levels higher, so ERROR is the minimum
    fn accepts(&self, level: Level) -> bool {
        level <= self.threshold
    }
}

/// Thread-safe log counters. Clones share state and alert subscribers.
#[derive(Clone)]
pub struct LogMetrics {
    state: Arc<Mutex<LogMetricsState>>,
    alerts: Arc<RwLock<Vec<AlertSubscriber>>>,
}

impl LogMetrics {
    pub fn new() -> Self {
        Self::from_window(MetricWindow::with_capacity(DEFAULT_DURATION_SAMPLES))
    }

    /// Keep at most `samples` durations for the summary.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroCapacity` if `samples` is zero.
    pub fn with_capacity(samples: usize) -> Result<Self, ConfigError> {
        Ok(Self::from_window(MetricWindow::new(samples)?))
    }

    fn from_window(durations: MetricWindow<f64>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LogMetricsState {
                total: 0,
                errors: 0,
                warnings: 0,
                by_level: BTreeMap::new(),
                by_target_errors: BTreeMap::new(),
                durations,
            })),
            alerts: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Count one log record from `target`, with the duration of the logged
    /// operation if any.
    pub fn record_log(&self, level: Level, target: &str, duration_ms: Option<f64>) {
        let mut state = lock(&self.state);
        state.total += 1;
        *state.by_level.entry(level.as_str().to_string()).or_insert(0) += 1;

        if level == Level::ERROR {
            state.errors += 1;
            *state
                .by_target_errors
                .entry(target.to_string())
                .or_insert(0) += 1;
        } else if level == Level::WARN {
            state.warnings += 1;
        }

        if let Some(duration) = duration_ms {
            state.durations.push(duration);
        }
    }

    /// Call `callback` for every alert at `threshold` or more severe.
    ///
    /// With `Level::WARN`, both WARN and ERROR records alert.
    pub fn add_alert<F>(&self, threshold: Level, callback: F)
    where
        F: Fn(&LogAlert) + Send + Sync + 'static,
    {
        write(&self.alerts).push(AlertSubscriber {
            threshold,
            callback: Arc::new(callback),
        });
    }

    pub fn clear_alerts(&self) {
        write(&self.alerts).clear();
    }

    /// Whether any subscriber wants records at `level`.
    pub fn alerts_on(&self, level: Level) -> bool {
        read(&self.alerts).iter().any(|s| s.accepts(level))
    }

    /// Hand `alert` to every subscriber whose threshold it meets.
    ///
    /// A panicking subscriber is logged and skipped.
    pub fn raise_alert(&self, alert: &LogAlert) {
        // Called without the lock held, so subscribers may log or subscribe
        let subscribers: Vec<AlertSubscriber> = read(&self.alerts).clone();

        for subscriber in subscribers.iter().filter(|s| s.accepts(alert.level)) {
            let result = panic::catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(alert)));
            if let Err(payload) = result {
                error!(
                    origin = alert.target.as_str(),
                    panic = panic_message(payload.as_ref()),
                    "Log alert callback panicked"
                );
            }
        }
    }

    pub fn statistics(&self) -> LogStats {
        let state = lock(&self.state);
        let error_rate = if state.total == 0 {
            0.0
        } else {
            state.errors as f64 / state.total as f64
        };

        LogStats {
            total: state.total,
            errors: state.errors,
            warnings: state.warnings,
            by_level: state.by_level.clone(),
            by_target_errors: state.by_target_errors.clone(),
            error_rate,
            duration: DurationSummary::from_samples(state.durations.iter().copied().collect()),
        }
    }

    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.total = 0;
        state.errors = 0;
        state.warnings = 0;
        state.by_level.clear();
        state.by_target_errors.clear();
        state.durations.clear();
    }
}

impl fmt::Debug for LogMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogMetrics")
            .field("state", &self.state)
            .field("alerts", &read(&self.alerts).len())
            .finish()
    }
}

impl Default for LogMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_level() {
        let metrics = LogMetrics::new();
        metrics.record_log(Level::INFO, "crm::sync", None);
        metrics.record_log(Level::INFO, "crm::sync", None);
        metrics.record_log(Level::WARN, "crm::sync", None);
        metrics.record_log(Level::ERROR, "crm::sync", None);

        let stats = metrics.statistics();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.warnings, 1);
        assert_eq!(stats.by_level["INFO"], 2);
        assert!((stats.error_rate - 0.25).abs() < f64::EPSILON);
        assert!(stats.duration.is_none());
    }

    #[test]
    fn test_duration_summary() {
        let metrics = LogMetrics::new();
        metrics.record_log(Level::INFO, "crm::http", Some(10.0));
        metrics.record_log(Level::DEBUG, "crm::http", Some(30.0));

        let duration = metrics.statistics().duration.unwrap();
        assert_eq!(duration.mean, 20.0);
        assert_eq!(duration.median, 20.0);
        assert_eq!(duration.max, 30.0);
    }

    #[test]
    fn test_duration_samples_are_bounded() {
        let metrics = LogMetrics::with_capacity(2).unwrap();
        for d in [1.0, 2.0, 3.0] {
            metrics.record_log(Level::INFO, "crm::http", Some(d));
        }

        let duration = metrics.statistics().duration.unwrap();
        assert_eq!(duration.min, 2.0);
        assert_eq!(metrics.statistics().total, 3);
    }

    #[test]
    fn test_reset() {
        let metrics = LogMetrics::new();
        metrics.record_log(Level::ERROR, "crm::http", Some(1.0));
        metrics.reset();
        assert_eq!(metrics.statistics(), LogStats::default());
    }

    #[test]
    fn test_errors_counted_per_target() {
        let metrics = LogMetrics::new();
        metrics.record_log(Level::ERROR, "crm::auth", None);
        metrics.record_log(Level::ERROR, "crm::sync", None);
        metrics.record_log(Level::ERROR, "crm::sync", None);
        metrics.record_log(Level::WARN, "crm::auth", None);

        let stats = metrics.statistics();
        assert_eq!(stats.by_target_errors.len(), 2);
        assert_eq!(stats.by_target_errors["crm::auth"], 1);
        assert_eq!(stats.by_target_errors["crm::sync"], 2);
    }

    #[test]
    fn test_alert_threshold() {
        let metrics = LogMetrics::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        metrics.add_alert(Level::WARN, move |alert| {
            sink.lock().unwrap().push(alert.level);
        });

        assert!(metrics.alerts_on(Level::ERROR));
        assert!(metrics.alerts_on(Level::WARN));
        assert!(!metrics.alerts_on(Level::INFO));

        for level in [Level::INFO, Level::WARN, Level::ERROR, Level::DEBUG] {
            metrics.raise_alert(&LogAlert {
                level,
                target: "crm::sync".to_string(),
                message: "x".to_string(),
            });
        }
        assert_eq!(*seen.lock().unwrap(), vec![Level::WARN, Level::ERROR]);
    }

    #[test]
    fn test_panicking_alert_does_not_stop_others() {
        let metrics = LogMetrics::new();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        metrics.add_alert(Level::ERROR, |_| panic!("pager down"));
        metrics.add_alert(Level::ERROR, move |_| *counter.lock().unwrap() += 1);

        metrics.raise_alert(&LogAlert {
            level: Level::ERROR,
            target: "crm::auth".to_string(),
            message: "token refresh failed".to_string(),
        });
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
