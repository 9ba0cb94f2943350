//! # crm-resilience
//!
//! Resilience and observability primitives for clients of rate-limited HTTP APIs.
//!
//! The crate bundles the pieces a CRM API client needs around every call:
//! a sliding-window rate gate, retries with exponential backoff, a TTL cache
//! for expensive metadata lookups, request and performance metrics with
//! windowed statistics, and a non-blocking queue that keeps slow log sinks off
//! the request path. Each piece works on its own; [`Resilience`] wires them
//! together.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crm_resilience::{Resilience, ResilienceConfig};
//! use std::time::Duration;
//!
//! let client: Resilience = Resilience::builder()
//!     .with_config(ResilienceConfig {
//!         rate_limit_per_minute: Some(100),
//!         max_retries: 3,
//!         retry_delay: Duration::from_secs(1),
//!         ..ResilienceConfig::default()
//!     })
//!     .build()
//!     .unwrap();
//!
//! // Rate limited, retried and recorded
//! let status: Result<u16, u16> = client.execute("GET", "Account", || Ok(200));
//!
//! // Fetched once per TTL
//! let metadata: Result<String, u16> =
//!     client.cached("metadata", || Ok("{\"entityDefs\": {}}".to_string()));
//!
//! let stats = client.collector().get_stats(None);
//! if let Some(requests) = stats.requests {
//!     println!("success rate: {:.1}%", requests.success_rate * 100.0);
//! }
//! ```
//!
//! ## Components
//!
//! ### Rate Limiting
//! [`RateGate`] admits at most `limit` calls in any trailing window (60s by
//! default). Callers over the limit sleep until the oldest call leaves the
//! window. A limit of `None` or `0` disables the gate.
//!
//! ### Retries
//! [`RetryExecutor`] runs an operation under a [`RetryPolicy`]: up to
//! `max_retries` extra attempts, waiting `delay`, `delay * factor`,
//! `delay * factor²`... between them. Only errors the policy classifies as
//! retryable are retried, and the last error is returned unchanged.
//!
//! ```rust
//! use crm_resilience::{RetryExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(2, Duration::from_millis(1), 2.0)
//!     .unwrap()
//!     .retry_if(|e: &String| e.contains("timeout"));
//!
//! let mut attempts = 0;
//! let result: Result<(), String> = RetryExecutor::new().run(&policy, || {
//!     attempts += 1;
//!     Err("timeout".to_string())
//! });
//!
//! assert!(result.is_err());
//! assert_eq!(attempts, 3);
//! ```
//!
//! ### Caching
//! [`ExpiringCache`] keeps values for a fixed TTL. Stale entries are treated
//! as absent and removed on access.
//!
//! ### Metrics
//! [`MetricsCollector`] records request outcomes, operation durations and
//! labeled counters. Recent metrics are kept in bounded rings by a
//! [`MetricsAggregator`], which computes success rates, per-endpoint counts
//! and latency summaries (mean, median, min, max), optionally restricted to a
//! trailing time window. Subscribers registered with
//! [`MetricsCollector::add_callback`] see every metric; a panicking subscriber
//! is logged and skipped.
//!
//! ```rust
//! use crm_resilience::MetricsCollector;
//! use std::collections::BTreeMap;
//!
//! let collector = MetricsCollector::new(1000).unwrap();
//! collector.record_request("GET", "Contact", Some(200), Some(120.0));
//! collector.record_request("GET", "Contact", Some(503), Some(900.0));
//!
//! {
//!     let _timer = collector.time_operation("sync_contacts", BTreeMap::new());
//!     // ... work ...
//! } // recorded here
//!
//! let stats = collector.get_stats(None);
//! assert_eq!(stats.requests.unwrap().server_errors, 1);
//! assert_eq!(stats.performance.unwrap().total, 1);
//! ```
//!
//! ### Non-blocking Logging
//! [`AsyncDispatchQueue`] hands items to a background worker that delivers
//! them to a synchronous [`Sink`]. When the queue is full, items are either
//! dropped or, after a bounded wait, emitted on the producer's thread. Sink
//! failures never reach producers. [`DispatchLayer`] feeds a queue from
//! `tracing`, and [`LogMetricsLayer`] counts events by level:
//!
//! ```rust,no_run
//! use crm_resilience::{AsyncDispatchQueue, DispatchConfig, DispatchLayer, LogMetricsLayer, WriterSink};
//! use std::sync::Arc;
//! use tracing_subscriber::prelude::*;
//!
//! let queue = Arc::new(
//!     AsyncDispatchQueue::new(WriterSink::new(std::io::stderr()), DispatchConfig::default())
//!         .unwrap(),
//! );
//! let log_metrics = LogMetricsLayer::new();
//!
//! tracing_subscriber::registry()
//!     .with(log_metrics.clone())
//!     .with(DispatchLayer::new(Arc::clone(&queue)))
//!     .init();
//!
//! tracing::error!(endpoint = "Lead", "request failed");
//!
//! // Flush what is still queued before exit
//! queue.close();
//! println!("{:?}", log_metrics.metrics().statistics());
//! ```
//!
//! ## Fail-Safe Operation
//!
//! None of the components let an observability failure break the caller:
//!
//! - panics in metric callbacks and sinks are caught and logged
//! - a poisoned lock is recovered instead of propagating the panic
//! - if the dispatch worker cannot be started, items are emitted inline
//! - a worker that does not stop within its join timeout is abandoned
//!
//! Invalid configuration is the exception: constructors return
//! [`ConfigError`] immediately rather than failing at call time.
//!
//! ## Feature Flags
//!
//! - `async`: `RateGate::admit_async` and `RetryExecutor::run_async` on tokio
//! - `serde`: `Serialize` for metrics and statistics, `Deserialize` for
//!   [`ResilienceConfig`]
//! - `test-helpers`: exposes `infrastructure::mocks` for downstream tests

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    admission::{Admission, AdmissionWindow},
    counter_key::CounterKey,
    error::ConfigError,
    metric::{
        Context, CounterMetric, Labels, MetricEvent, PerformanceMetric, RequestDetails,
        RequestMetric, StatusClass,
    },
    policy::{Classified, RetryPolicy},
    stats::{DurationSummary, EndpointStats, OperationStats, PerformanceStats, RequestStats},
    window::MetricWindow,
};

pub use application::{
    aggregator::MetricsAggregator,
    cache::{CacheInfo, ExpiringCache},
    collector::{MetricCallback, MetricsCollector, OperationTimer, StatsSnapshot, Timer},
    counters::CounterRegistry,
    dispatch::{AsyncDispatchQueue, DispatchConfig, SubmitOutcome},
    log_metrics::{AlertCallback, LogAlert, LogMetrics, LogStats},
    metrics::{DispatchMetrics, DispatchMetricsSnapshot},
    ports::{Clock, Sink, SinkError, Sleeper, StatusCode, Storage},
    rate_gate::{RateGate, RateGateBuilder, RateGateStats},
    registry::{default_collector, install_default_collector},
    retry::RetryExecutor,
};

pub use infrastructure::{
    clock::SystemClock,
    layer::{DispatchLayer, LogMetricsLayer},
    resilience::{BuildError, Resilience, ResilienceBuilder, ResilienceConfig},
    sink::{FnSink, LogRecord, TracingSink, WriterSink},
    storage::ShardedStorage,
};
