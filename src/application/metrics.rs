//! Self-observability for the dispatch queue.
//!
//! Tracks how many items were accepted, delivered, dropped or emitted on the
//! producer's thread, so overload and faulty sinks are visible.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Counters describing dispatch queue behaviour.
///
/// All counters use atomic operations and can be read at any time. Clones
/// share the same counters.
#[derive(Debug, Clone, Default)]
pub struct DispatchMetrics {
    inner: Arc<DispatchMetricsInner>,
}

#[derive(Debug, Default)]
struct DispatchMetricsInner {
    submitted: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    emitted_inline: AtomicU64,
    sink_failures: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_submitted(&self) {
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.inner.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_emitted_inline(&self) {
        self.inner.emitted_inline.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sink_failure(&self) {
        self.inner.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Items handed to `submit`.
    pub fn submitted(&self) -> u64 {
        self.inner.submitted.load(Ordering::Relaxed)
    }

    /// Items the sink accepted, from either the worker or the producer thread.
    pub fn delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Items discarded because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Items emitted synchronously after the block timeout elapsed.
    pub fn emitted_inline(&self) -> u64 {
        self.inner.emitted_inline.load(Ordering::Relaxed)
    }

    /// Emit calls that returned an error or panicked.
    pub fn sink_failures(&self) -> u64 {
        self.inner.sink_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> DispatchMetricsSnapshot {
        DispatchMetricsSnapshot {
            submitted: self.submitted(),
            delivered: self.delivered(),
            dropped: self.dropped(),
            emitted_inline: self.emitted_inline(),
            sink_failures: self.sink_failures(),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.inner.submitted.store(0, Ordering::Relaxed);
        self.inner.delivered.store(0, Ordering::Relaxed);
        self.inner.dropped.store(0, Ordering::Relaxed);
        self.inner.emitted_inline.store(0, Ordering::Relaxed);
        self.inner.sink_failures.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DispatchMetricsSnapshot {
    pub submitted: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub emitted_inline: u64,
    pub sink_failures: u64,
}

impl DispatchMetricsSnapshot {
    /// Share of submitted items that were dropped (0.0 to 1.0).
    ///
    /// Returns 0.0 if nothing has been submitted.
    pub fn drop_rate(&self) -> f64 {
        if self.submitted == 0 {
            0.0
        } else {
            self.dropped as f64 / self.submitted as f64
        }
    }

    /// Items submitted but not yet delivered, dropped or failed.
    pub fn in_flight(&self) -> u64 {
        self.submitted
            .saturating_sub(self.delivered)
            .saturating_sub(self.dropped)
            .saturating_sub(self.sink_failures)
    }
}
