//! Statistical rollups over metric records.
//!
//! All functions here are pure: they take an iterator of records that has
//! already been filtered to the window of interest and compute summaries.
//! Empty input yields a zeroed result.

use crate::domain::metric::{PerformanceMetric, RequestMetric, StatusClass};
use std::collections::BTreeMap;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Mean, median, min and max of a set of millisecond samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DurationSummary {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

impl DurationSummary {
    /// Summarize `samples`, or `None` if there are none.
    ///
    /// The median of an even number of samples is the mean of the two middle
    /// values.
    pub fn from_samples(mut samples: Vec<f64>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_by(|a, b| a.total_cmp(b));

        let len = samples.len();
        let mid = len / 2;
        let median = if len % 2 == 0 {
            (samples[mid - 1] + samples[mid]) / 2.0
        } else {
            samples[mid]
        };

        Some(Self {
            mean: samples.iter().sum::<f64>() / len as f64,
            median,
            min: samples[0],
            max: samples[len - 1],
        })
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Per `"{method} {endpoint}"` breakdown.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EndpointStats {
    pub count: usize,
    pub successes: usize,
    /// Every request that was not a success, including unknown outcomes
    pub errors: usize,
    pub success_rate: f64,
    /// Absent when no request to this endpoint carried a latency
    pub latency: Option<DurationSummary>,
}

/// Aggregate request statistics.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RequestStats {
    pub total: usize,
    pub successful: usize,
    pub client_errors: usize,
    pub server_errors: usize,
    pub success_rate: f64,
    pub error_rate: f64,
    /// Zeroed when no request carried a latency
    pub latency: DurationSummary,
    pub endpoints: BTreeMap<String, EndpointStats>,
    /// Trailing window the stats were restricted to, `None` for all records
    pub window: Option<Duration>,
    pub sample_size: usize,
}

impl RequestStats {
    /// Compute statistics over `metrics`.
    pub fn compute<'a, I>(metrics: I, window: Option<Duration>) -> Self
    where
        I: IntoIterator<Item = &'a RequestMetric>,
    {
        let mut stats = RequestStats {
            window,
            ..Self::default()
        };
        let mut latencies = Vec::new();
        let mut per_endpoint: BTreeMap<String, (EndpointStats, Vec<f64>)> = BTreeMap::new();

        for metric in metrics {
            stats.total += 1;
            let class = metric.class();
            match class {
                StatusClass::Success => stats.successful += 1,
                StatusClass::ClientError => stats.client_errors += 1,
                StatusClass::ServerError => stats.server_errors += 1,
                StatusClass::Unknown => {}
            }

            let (endpoint, samples) = per_endpoint.entry(metric.endpoint_key()).or_default();
            endpoint.count += 1;
            if class == StatusClass::Success {
                endpoint.successes += 1;
            } else {
                endpoint.errors += 1;
            }

            if let Some(latency) = metric.latency_ms {
                latencies.push(latency);
                samples.push(latency);
            }
        }

        stats.sample_size = stats.total;
        stats.success_rate = ratio(stats.successful, stats.total);
        stats.error_rate = ratio(stats.client_errors + stats.server_errors, stats.total);
        stats.latency = DurationSummary::from_samples(latencies).unwrap_or_default();
        stats.endpoints = per_endpoint
            .into_iter()
            .map(|(key, (mut endpoint, samples))| {
                endpoint.success_rate = ratio(endpoint.successes, endpoint.count);
                endpoint.latency = DurationSummary::from_samples(samples);
                (key, endpoint)
            })
            .collect();

        stats
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Per-operation duration breakdown.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct OperationStats {
    pub count: usize,
    pub duration: DurationSummary,
}

/// Aggregate performance statistics.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PerformanceStats {
    pub total: usize,
    pub duration: DurationSummary,
    pub operations: BTreeMap<String, OperationStats>,
    pub window: Option<Duration>,
    pub sample_size: usize,
}

impl PerformanceStats {
    /// Compute statistics over `metrics`, grouped by operation name.
    pub fn compute<'a, I>(metrics: I, window: Option<Duration>) -> Self
    where
        I: IntoIterator<Item = &'a PerformanceMetric>,
    {
        let mut all = Vec::new();
        let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for metric in metrics {
            all.push(metric.duration_ms);
            grouped
                .entry(metric.operation.clone())
                .or_default()
                .push(metric.duration_ms);
        }

        let total = all.len();
        let operations = grouped
            .into_iter()
            .map(|(name, samples)| {
                let stats = OperationStats {
                    count: samples.len(),
                    duration: DurationSummary::from_samples(samples).unwrap_or_default(),
                };
                (name, stats)
            })
            .collect();

        PerformanceStats {
            total,
            duration: DurationSummary::from_samples(all).unwrap_or_default(),
            operations,
            window,
            sample_size: total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
