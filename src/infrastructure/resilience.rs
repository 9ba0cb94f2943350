//! Facade composing the resilience components for one API client.
//!
//! A [`Resilience`] owns a rate gate, a retry executor, a metrics collector
//! and a response cache, all wired to the same clock. [`Resilience::execute`]
//! runs one logical request through them:
//!
//! 1. every attempt first passes the rate gate
//! 2. the attempt is timed and recorded as a request metric, with the status
//!    taken from the outcome through the [`StatusCode`] port
//! 3. failures are retried with exponential backoff until the policy gives up
//!
//! # Example
//! ```
//! use crm_resilience::{Resilience, ResilienceConfig};
//! use std::time::Duration;
//!
//! let config = ResilienceConfig {
//!     rate_limit_per_minute: Some(120),
//!     retry_delay: Duration::from_millis(1),
//!     ..ResilienceConfig::default()
//! };
//! let client: Resilience = Resilience::builder().with_config(config).build().unwrap();
//!
//! let status: Result<u16, u16> = client.execute("GET", "Account", || Ok(200));
//! assert_eq!(status, Ok(200));
//!
//! let stats = client.collector().get_stats(None);
//! assert_eq!(stats.requests.unwrap().total, 1);
//! ```

use crate::application::cache::{ExpiringCache, DEFAULT_TTL};
use crate::application::collector::MetricsCollector;
use crate::application::dispatch::DispatchConfig;
use crate::application::ports::{Clock, Sleeper, StatusCode};
use crate::application::rate_gate::{validate_limit, RateGate};
use crate::application::retry::RetryExecutor;
use crate::domain::error::ConfigError;
use crate::domain::policy::RetryPolicy;
use crate::infrastructure::clock::SystemClock;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest accepted `max_retries`.
pub const MAX_RETRIES: u32 = 10;

/// Largest accepted initial retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Counter tracking cache lookups made through [`Resilience::cached`].
pub const CACHE_LOOKUPS_COUNTER: &str = "cache_lookups";

/// Settings for every component of a [`Resilience`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResilienceConfig {
    /// Calls allowed per minute; `None` or `Some(0)` disables the gate
    pub rate_limit_per_minute: Option<i64>,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub retry_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub backoff_factor: f64,
    /// Lifetime of cached responses
    pub cache_ttl: Duration,
    /// Request and performance metrics kept for statistics
    pub metrics_window_size: usize,
    /// Capacity of dispatch queues built from this config
    pub dispatch_capacity: usize,
    /// Drop log records instead of blocking when a queue is full
    pub drop_on_full: bool,
    /// How long a producer waits for queue space before emitting inline
    pub block_timeout: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: None,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            cache_ttl: DEFAULT_TTL,
            metrics_window_size: 1000,
            dispatch_capacity: 1000,
            drop_on_full: true,
            block_timeout: Duration::from_secs(1),
        }
    }
}

impl ResilienceConfig {
    /// Check every field without building anything.
    ///
    /// # Errors
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_limit(self.rate_limit_per_minute)?;
        if self.max_retries > MAX_RETRIES {
            return Err(ConfigError::TooManyRetries(self.max_retries));
        }
        if self.retry_delay > MAX_RETRY_DELAY {
            return Err(ConfigError::DelayOutOfRange(self.retry_delay));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::InvalidBackoffFactor(self.backoff_factor));
        }
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        if self.metrics_window_size == 0 || self.dispatch_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    /// Retry policy retrying every error with this config's backoff.
    pub fn retry_policy<E: 'static>(&self) -> Result<RetryPolicy<E>, ConfigError> {
        RetryPolicy::new(self.max_retries, self.retry_delay, self.backoff_factor)
    }

    /// Queue settings for a log dispatch queue.
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::with_capacity(self.dispatch_capacity)
            .drop_on_full(self.drop_on_full)
            .block_timeout(self.block_timeout)
    }
}

/// Error returned when building a [`Resilience`] fails.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    /// A component rejected its configuration
    Config(ConfigError),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Config(e) => write!(f, "resilience configuration error: {}", e),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Config(e) => Some(e),
        }
    }
}

impl From<ConfigError> for BuildError {
    fn from(e: ConfigError) -> Self {
        BuildError::Config(e)
    }
}

/// Builder for constructing a [`Resilience`].
pub struct ResilienceBuilder {
    config: ResilienceConfig,
    clock: Option<Arc<dyn Clock>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    collector: Option<MetricsCollector>,
}

impl ResilienceBuilder {
    pub fn with_config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a custom clock (for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set a custom sleeper for rate gate waits and retry backoff (for testing).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Record into an existing collector instead of building one.
    ///
    /// The collector keeps its own clock and window size.
    pub fn with_collector(mut self, collector: MetricsCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Build the facade.
    ///
    /// # Errors
    /// Returns `BuildError::Config` if any setting is invalid.
    pub fn build<V: Clone>(self) -> Result<Resilience<V>, BuildError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let sleeper = self
            .sleeper
            .unwrap_or_else(|| Arc::new(SystemClock::new()));

        let gate = RateGate::builder()
            .with_limit(self.config.rate_limit_per_minute)
            .with_clock(Arc::clone(&clock))
            .with_sleeper(Arc::clone(&sleeper))
            .build()?;
        let collector = match self.collector {
            Some(collector) => collector,
            None => MetricsCollector::with_clock(self.config.metrics_window_size, Arc::clone(&clock))?,
        };
        let cache = ExpiringCache::with_clock(self.config.cache_ttl, Arc::clone(&clock))?;

        debug!(
            rate_limit = ?gate.limit(),
            max_retries = self.config.max_retries,
            cache_ttl_secs = self.config.cache_ttl.as_secs(),
            "Resilience built"
        );

        Ok(Resilience {
            config: self.config,
            gate,
            executor: RetryExecutor::with_sleeper(sleeper),
            collector,
            cache,
            clock,
        })
    }
}

/// Rate limiting, retries, metrics and caching for one API client.
///
/// `V` is the type of cached responses.
pub struct Resilience<V = String> {
    config: ResilienceConfig,
    gate: RateGate,
    executor: RetryExecutor,
    collector: MetricsCollector,
    cache: ExpiringCache<String, V>,
    clock: Arc<dyn Clock>,
}

impl Resilience {
    /// Create a builder with default settings.
    pub fn builder() -> ResilienceBuilder {
        ResilienceBuilder {
            config: ResilienceConfig::default(),
            clock: None,
            sleeper: None,
            collector: None,
        }
    }
}

impl<V: Clone> Resilience<V> {
    /// Run `operation` under the configured retry policy, retrying every error.
    ///
    /// See [`execute_with`](Self::execute_with).
    pub fn execute<T, E, F>(&self, method: &str, endpoint: &str, operation: F) -> Result<T, E>
    where
        T: StatusCode,
        E: StatusCode + Display + 'static,
        F: FnMut() -> Result<T, E>,
    {
        match self.config.retry_policy() {
            Ok(policy) => self.execute_with(&policy, method, endpoint, operation),
            // validated at build time
            Err(_) => self.execute_with(&RetryPolicy::no_retry(), method, endpoint, operation),
        }
    }

    /// Run `operation` under `policy`.
    ///
    /// Each attempt waits for the rate gate, is timed, and is recorded as one
    /// request metric. The last error is returned unchanged when the policy
    /// gives up.
    pub fn execute_with<T, E, F>(
        &self,
        policy: &RetryPolicy<E>,
        method: &str,
        endpoint: &str,
        mut operation: F,
    ) -> Result<T, E>
    where
        T: StatusCode,
        E: StatusCode + Display + 'static,
        F: FnMut() -> Result<T, E>,
    {
        self.executor.run(policy, || {
            self.gate.admit();

            let started = self.clock.now();
            let outcome = operation();
            let latency_ms = self.clock.now().duration_since(started).as_secs_f64() * 1000.0;

            let status = match &outcome {
                Ok(response) => response.status_code(),
                Err(error) => error.status_code(),
            };
            self.collector
                .record_request(method, endpoint, status, Some(latency_ms));
            outcome
        })
    }

    /// Return the cached value for `key`, or call `fetch` and cache its result.
    ///
    /// Errors from `fetch` are returned and not cached.
    pub fn cached<E, F>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.cache.get(key) {
            self.collector
                .increment_counter(CACHE_LOOKUPS_COUNTER, 1, [("result", "hit")]);
            return Ok(value);
        }

        self.collector
            .increment_counter(CACHE_LOOKUPS_COUNTER, 1, [("result", "miss")]);
        let value = fetch()?;
        self.cache.set(key.to_string(), value.clone());
        Ok(value)
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn rate_gate(&self) -> &RateGate {
        &self.gate
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    pub fn cache(&self) -> &ExpiringCache<String, V> {
        &self.cache
    }
}

impl<V> fmt::Debug for Resilience<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resilience")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .field("collector", &self.collector)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
