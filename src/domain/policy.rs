//! Retry policies.
//!
//! A policy decides how many times a failed operation is retried, how long to
//! wait between attempts, and which failures are worth retrying at all.

use crate::domain::error::ConfigError;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Errors that can report a coarse kind, used to select retryable failures.
///
/// ```
/// use crm_resilience::Classified;
///
/// #[derive(Debug)]
/// enum ApiError {
///     Timeout,
///     NotFound,
/// }
///
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// enum ApiErrorKind {
///     Transient,
///     Permanent,
/// }
///
/// impl Classified for ApiError {
///     type Kind = ApiErrorKind;
///
///     fn kind(&self) -> ApiErrorKind {
///         match self {
///             ApiError::Timeout => ApiErrorKind::Transient,
///             ApiError::NotFound => ApiErrorKind::Permanent,
///         }
///     }
/// }
/// ```
pub trait Classified {
    type Kind: Eq + Hash + Clone + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Multiplicative backoff retry policy.
///
/// Total attempts are `max_retries + 1`. The delay starts at `initial_delay`
/// and is multiplied by `backoff_factor` after each retry, optionally capped
/// by `max_delay`. No jitter is added.
///
/// # Example
/// ```
/// use crm_resilience::RetryPolicy;
/// use std::time::Duration;
///
/// let policy: RetryPolicy<std::io::Error> =
///     RetryPolicy::new(3, Duration::from_millis(100), 2.0).unwrap();
///
/// let delays: Vec<_> = policy.delays().collect();
/// assert_eq!(
///     delays,
///     vec![
///         Duration::from_millis(100),
///         Duration::from_millis(200),
///         Duration::from_millis(400),
///     ]
/// );
/// ```
pub struct RetryPolicy<E> {
    max_retries: u32,
    initial_delay: Duration,
    backoff_factor: f64,
    max_delay: Option<Duration>,
    retryable: RetryPredicate<E>,
}

impl<E: 'static> RetryPolicy<E> {
    /// Create a policy that retries every error.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidBackoffFactor` if `backoff_factor` is not
    /// finite or is below 1.0.
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        backoff_factor: f64,
    ) -> Result<Self, ConfigError> {
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(ConfigError::InvalidBackoffFactor(backoff_factor));
        }
        Ok(Self {
            max_retries,
            initial_delay,
            backoff_factor,
            max_delay: None,
            retryable: Arc::new(|_: &E| true),
        })
    }

    /// A policy making exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: None,
            retryable: Arc::new(|_: &E| false),
        }
    }

    /// Only retry errors for which `predicate` returns true.
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    /// Cap every computed delay at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn is_retryable(&self, error: &E) -> bool {
        (self.retryable)(error)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// First delay, after applying the cap.
    pub(crate) fn first_delay(&self) -> Duration {
        self.capped(self.initial_delay)
    }

    /// Delay that follows `current` in the schedule.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let scaled = Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .unwrap_or(Duration::MAX);
        self.capped(scaled)
    }

    fn capped(&self, delay: Duration) -> Duration {
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// The full schedule of delays, one per retry.
    pub fn delays(&self) -> Delays<'_, E> {
        Delays {
            policy: self,
            next: self.first_delay(),
            remaining: self.max_retries,
        }
    }
}

impl<E: Classified + 'static> RetryPolicy<E> {
    /// Only retry errors whose kind is one of `kinds`.
    pub fn retry_on_kinds<I>(self, kinds: I) -> Self
    where
        I: IntoIterator<Item = E::Kind>,
    {
        let kinds: HashSet<E::Kind> = kinds.into_iter().collect();
        self.retry_if(move |error: &E| kinds.contains(&error.kind()))
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            initial_delay: self.initial_delay,
            backoff_factor: self.backoff_factor,
            max_delay: self.max_delay,
            retryable: Arc::clone(&self.retryable),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("max_delay", &self.max_delay)
            .field("retryable", &"<fn>")
            .finish()
    }
}

/// Iterator over a policy's backoff schedule.
pub struct Delays<'a, E> {
    policy: &'a RetryPolicy<E>,
    next: Duration,
    remaining: u32,
}

impl<E: 'static> Iterator for Delays<'_, E> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next;
        self.next = self.policy.next_delay(current);
        Some(current)
    }
}
