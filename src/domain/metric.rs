//! Metric records.
//!
//! Each metric kind is its own struct. Request and performance metrics are
//! built once at the call site and never mutated afterwards; counters are the
//! only records updated in place.

use std::collections::BTreeMap;
use std::time::{Instant, SystemTime};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Label set attached to a counter. Sorted, so iteration order never matters.
pub type Labels = BTreeMap<String, String>;

/// Free-form context attached to a performance metric.
pub type Context = BTreeMap<String, String>;

/// Classification of a request outcome by HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum StatusClass {
    /// 200..=399
    Success,
    /// 400..=499
    ClientError,
    /// 500 and above
    ServerError,
    /// No status code, or an informational one
    Unknown,
}

impl StatusClass {
    /// Classify an optional status code.
    pub fn of(status_code: Option<u16>) -> Self {
        match status_code {
            Some(200..=399) => StatusClass::Success,
            Some(400..=499) => StatusClass::ClientError,
            Some(500..) => StatusClass::ServerError,
            _ => StatusClass::Unknown,
        }
    }
}

/// Outcome of a single API request.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RequestMetric {
    pub method: String,
    pub endpoint: String,
    pub status_code: Option<u16>,
    pub latency_ms: Option<f64>,
    pub request_size_bytes: Option<u64>,
    pub response_size_bytes: Option<u64>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub error_message: Option<String>,
    /// Wall-clock time the metric was recorded
    pub timestamp: SystemTime,
    /// Monotonic time the metric was recorded, used for windowed stats
    #[cfg_attr(feature = "serde", serde(skip))]
    pub recorded_at: Instant,
}

impl RequestMetric {
    /// Build a request metric from its details, stamped with `recorded_at`.
    pub fn new(details: RequestDetails, recorded_at: Instant) -> Self {
        Self {
            method: details.method,
            endpoint: details.endpoint,
            status_code: details.status_code,
            latency_ms: details.latency_ms,
            request_size_bytes: details.request_size_bytes,
            response_size_bytes: details.response_size_bytes,
            request_id: details.request_id,
            user_id: details.user_id,
            error_message: details.error_message,
            timestamp: SystemTime::now(),
            recorded_at,
        }
    }

    /// Status classification of this request.
    pub fn class(&self) -> StatusClass {
        StatusClass::of(self.status_code)
    }

    pub fn is_success(&self) -> bool {
        self.class() == StatusClass::Success
    }

    pub fn is_client_error(&self) -> bool {
        self.class() == StatusClass::ClientError
    }

    pub fn is_server_error(&self) -> bool {
        self.class() == StatusClass::ServerError
    }

    /// Key used for per-endpoint breakdowns: `"{method} {endpoint}"`.
    pub fn endpoint_key(&self) -> String {
        format!("{} {}", self.method, self.endpoint)
    }
}

/// Everything a transport can report about a request.
///
/// Only `method` and `endpoint` are required; the rest default to absent.
///
/// ```
/// use crm_resilience::RequestDetails;
///
/// let details = RequestDetails::new("GET", "Contact")
///     .with_status(200)
///     .with_latency_ms(42.0)
///     .with_request_id("req-1");
/// assert_eq!(details.status_code, Some(200));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDetails {
    pub method: String,
    pub endpoint: String,
    pub status_code: Option<u16>,
    pub latency_ms: Option<f64>,
    pub request_size_bytes: Option<u64>,
    pub response_size_bytes: Option<u64>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub error_message: Option<String>,
}

impl RequestDetails {
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_sizes(mut self, request_bytes: u64, response_bytes: u64) -> Self {
        self.request_size_bytes = Some(request_bytes);
        self.response_size_bytes = Some(response_bytes);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Duration of a named operation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PerformanceMetric {
    pub operation: String,
    pub duration_ms: f64,
    pub context: Context,
    pub timestamp: SystemTime,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub recorded_at: Instant,
}

impl PerformanceMetric {
    pub fn new(
        operation: impl Into<String>,
        duration_ms: f64,
        context: Context,
        recorded_at: Instant,
    ) -> Self {
        Self {
            operation: operation.into(),
            duration_ms,
            context,
            timestamp: SystemTime::now(),
            recorded_at,
        }
    }
}

/// Named monotonic counter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CounterMetric {
    pub name: String,
    pub labels: Labels,
    pub value: u64,
    pub updated_at: SystemTime,
}

impl CounterMetric {
    pub fn new(name: impl Into<String>, labels: Labels) -> Self {
        Self {
            name: name.into(),
            labels,
            value: 0,
            updated_at: SystemTime::now(),
        }
    }

    /// Add `amount` to the counter. Saturates instead of wrapping.
    pub fn increment(&mut self, amount: u64) {
        self.value = self.value.saturating_add(amount);
        self.updated_at = SystemTime::now();
    }
}

/// A freshly recorded metric, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", content = "data", rename_all = "snake_case"))]
pub enum MetricEvent {
    Request(RequestMetric),
    Performance(PerformanceMetric),
}

impl MetricEvent {
    /// Short name of the metric kind.
    pub fn kind(&self) -> &'static str {
        match self {
            MetricEvent::Request(_) => "request",
            MetricEvent::Performance(_) => "performance",
        }
    }
}
