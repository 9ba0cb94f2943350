//! Tracing integration layers.
//!
//! - [`LogMetricsLayer`] counts every event by level into [`LogMetrics`]
//! - [`DispatchLayer`] forwards every event to an [`AsyncDispatchQueue`]
//!
//! ```rust,no_run
//! use crm_resilience::{
//!     AsyncDispatchQueue, DispatchConfig, DispatchLayer, LogMetricsLayer, WriterSink,
//! };
//! use std::sync::Arc;
//! use tracing_subscriber::prelude::*;
//!
//! let metrics_layer = LogMetricsLayer::new();
//! let log_metrics = metrics_layer.metrics().clone();
//!
//! let queue = Arc::new(
//!     AsyncDispatchQueue::new(WriterSink::new(std::io::stderr()), DispatchConfig::default())
//!         .unwrap(),
//! );
//!
//! tracing_subscriber::registry()
//!     .with(metrics_layer)
//!     .with(DispatchLayer::new(Arc::clone(&queue)))
//!     .init();
//!
//! tracing::warn!(duration_ms = 830.0, "slow metadata fetch");
//! assert_eq!(log_metrics.statistics().warnings, 1);
//! ```

use crate::application::dispatch::{AsyncDispatchQueue, DISPATCH_TARGET};
use crate::application::log_metrics::{LogAlert, LogMetrics, LOG_METRICS_TARGET};
use crate::infrastructure::sink::{LogRecord, TRACING_SINK_TARGET};
use crate::infrastructure::visitor::{FieldVisitor, NumericFieldVisitor};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{Event, Subscriber};
use tracing_subscriber::{layer::Context, Layer};

/// Name of the event field collected into duration statistics.
pub const DURATION_FIELD: &str = "duration_ms";

/// Layer counting events by level, and ERROR events by target.
///
/// Events carrying a numeric `duration_ms` field also feed the duration
/// summary. Events at or above an alert threshold registered with
/// [`LogMetrics::add_alert`] are handed to that subscriber.
#[derive(Debug, Clone, Default)]
pub struct LogMetricsLayer {
    metrics: LogMetrics,
}

impl LogMetricsLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record into existing metrics, e.g. ones shared with another layer.
    pub fn with_metrics(metrics: LogMetrics) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &LogMetrics {
        &self.metrics
    }
}

impl<S> Layer<S> for LogMetricsLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = *metadata.level();

        let mut visitor = NumericFieldVisitor::new(DURATION_FIELD);
        event.record(&mut visitor);
        self.metrics
            .record_log(level, metadata.target(), visitor.value());

        // A panicking subscriber is reported at ERROR; never alert on that
        if metadata.target() != LOG_METRICS_TARGET && self.metrics.alerts_on(level) {
            let mut fields = FieldVisitor::new();
            event.record(&mut fields);
            let (message, _) = fields.into_parts();
            self.metrics.raise_alert(&LogAlert {
                level,
                target: metadata.target().to_string(),
                message: message.unwrap_or_default(),
            });
        }
    }
}

/// Layer handing every event to a dispatch queue as a [`LogRecord`].
///
/// Events emitted by the queue itself and by `TracingSink` are skipped, so a
/// queue draining into `TracingSink` cannot feed itself.
pub struct DispatchLayer {
    queue: Arc<AsyncDispatchQueue<LogRecord>>,
}

impl DispatchLayer {
    pub fn new(queue: Arc<AsyncDispatchQueue<LogRecord>>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<AsyncDispatchQueue<LogRecord>> {
        &self.queue
    }
}

impl<S> Layer<S> for DispatchLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if target == TRACING_SINK_TARGET || target == DISPATCH_TARGET {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);
        let (message, fields) = visitor.into_parts();

        self.queue.submit(LogRecord {
            level: *metadata.level(),
            target: target.to_string(),
            message: message.unwrap_or_default(),
            fields,
            timestamp: SystemTime::now(),
        });
    }
}

impl fmt::Debug for DispatchLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchLayer")
            .field("queue", &self.queue)
            .finish()
    }
}
