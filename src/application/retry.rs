//! Retry with multiplicative backoff.
//!
//! The executor calls an operation, sleeps between retryable failures
//! according to a [`RetryPolicy`], and returns the last error unchanged once
//! the policy is exhausted.

use crate::application::ports::Sleeper;
use crate::domain::policy::RetryPolicy;
use crate::infrastructure::clock::SystemClock;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[cfg(feature = "async")]
use std::future::Future;

/// Runs fallible operations under a retry policy.
///
/// # Example
/// ```
/// use crm_resilience::{RetryExecutor, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(1), 2.0).unwrap();
/// let executor = RetryExecutor::new();
///
/// let mut calls = 0;
/// let result: Result<u32, String> = executor.run(&policy, || {
///     calls += 1;
///     if calls < 3 {
///         Err(format!("attempt {} failed", calls))
///     } else {
///         Ok(calls)
///     }
/// });
///
/// assert_eq!(result, Ok(3));
/// ```
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    sleeper: Arc<dyn Sleeper>,
}

impl RetryExecutor {
    /// Executor that blocks the calling thread between attempts.
    pub fn new() -> Self {
        Self {
            sleeper: Arc::new(SystemClock::new()),
        }
    }

    /// Executor that waits through `sleeper` (useful for testing).
    pub fn with_sleeper(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    /// Call `operation` until it succeeds, fails with a non-retryable error,
    /// or the policy runs out of attempts.
    ///
    /// Returns the operation's own error on failure; it is never wrapped.
    pub fn run<T, E, F>(&self, policy: &RetryPolicy<E>, mut operation: F) -> Result<T, E>
    where
        E: Display + 'static,
        F: FnMut() -> Result<T, E>,
    {
        let max_attempts = policy.max_attempts();
        let mut delay = policy.first_delay();
        let mut attempt: u32 = 1;

        loop {
            let error = match operation() {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !should_retry(policy, &error, attempt, max_attempts, delay) {
                return Err(error);
            }

            self.sleeper.sleep(delay);
            delay = policy.next_delay(delay);
            attempt += 1;
        }
    }

    /// Async variant of [`run`](Self::run), sleeping on the tokio timer.
    #[cfg(feature = "async")]
    pub async fn run_async<T, E, F, Fut>(
        &self,
        policy: &RetryPolicy<E>,
        mut operation: F,
    ) -> Result<T, E>
    where
        E: Display + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = policy.max_attempts();
        let mut delay = policy.first_delay();
        let mut attempt: u32 = 1;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !should_retry(policy, &error, attempt, max_attempts, delay) {
                return Err(error);
            }

            tokio::time::sleep(delay).await;
            delay = policy.next_delay(delay);
            attempt += 1;
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Decide whether to try again after `error`, logging the decision.
fn should_retry<E>(
    policy: &RetryPolicy<E>,
    error: &E,
    attempt: u32,
    max_attempts: u32,
    delay: Duration,
) -> bool
where
    E: Display + 'static,
{
    if !policy.is_retryable(error) {
        debug!(attempt, error = %error, "Operation failed with a non-retryable error");
        return false;
    }

    if attempt >= max_attempts {
        error!(attempts = attempt, error = %error, "Operation failed after all retries");
        return false;
    }

    warn!(
        attempt,
        max_attempts,
        delay_ms = delay.as_millis() as u64,
        error = %error,
        "Operation failed, retrying"
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;
    use std::cell::Cell;
    use std::fmt;
    use std::time::Instant;

    #[derive(Debug, PartialEq)]
    enum FetchError {
        Timeout(u32),
        Forbidden,
    }

    impl fmt::Display for FetchError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                FetchError::Timeout(n) => write!(f, "timeout on attempt {}", n),
                FetchError::Forbidden => write!(f, "forbidden"),
            }
        }
    }

    fn executor() -> (RetryExecutor, MockClock) {
        let clock = MockClock::new(Instant::now());
        (RetryExecutor::with_sleeper(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_exhaustion_returns_last_error() {
        let (executor, clock) = executor();
        let policy = RetryPolicy::new(3, Duration::from_millis(100), 2.0).unwrap();
        let calls = Cell::new(0);

        let result: Result<(), FetchError> = executor.run(&policy, || {
            calls.set(calls.get() + 1);
            Err(FetchError::Timeout(calls.get()))
        });

        assert_eq!(calls.get(), 4);
        assert_eq!(result, Err(FetchError::Timeout(4)));
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
    }

    #[test]
    fn test_non_retryable_error_is_immediate() {
        let (executor, clock) = executor();
        let policy = RetryPolicy::new(5, Duration::from_secs(1), 2.0)
            .unwrap()
            .retry_if(|e: &FetchError| matches!(e, FetchError::Timeout(_)));
        let calls = Cell::new(0);

        let result: Result<(), FetchError> = executor.run(&policy, || {
            calls.set(calls.get() + 1);
            Err(FetchError::Forbidden)
        });

        assert_eq!(calls.get(), 1);
        assert_eq!(result, Err(FetchError::Forbidden));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_zero_retries_single_attempt() {
        let (executor, _clock) = executor();
        let policy = RetryPolicy::new(0, Duration::from_secs(1), 2.0).unwrap();
        let calls = Cell::new(0);

        let result: Result<(), FetchError> = executor.run(&policy, || {
            calls.set(calls.get() + 1);
            Err(FetchError::Timeout(1))
        });

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_success_after_failures() {
        let (executor, clock) = executor();
        let policy = RetryPolicy::new(3, Duration::from_millis(10), 1.0).unwrap();
        let calls = Cell::new(0);

        let result = executor.run(&policy, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(FetchError::Timeout(calls.get()))
            } else {
                Ok("done")
            }
        });

        assert_eq!(result, Ok("done"));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(10); 2]);
    }

    #[test]
    fn test_each_failure_is_logged() {
        use crate::infrastructure::mocks::MockCaptureLayer;
        use tracing::Level;
        use tracing_subscriber::layer::SubscriberExt;

        let capture = MockCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let (executor, _clock) = executor();
        let policy = RetryPolicy::new(2, Duration::from_millis(50), 2.0).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            let _: Result<(), FetchError> =
                executor.run(&policy, || Err(FetchError::Timeout(0)));
        });

        let events = capture.get_captured();
        let warnings: Vec<_> = events.iter().filter(|e| e.level == Level::WARN).collect();
        let errors: Vec<_> = events.iter().filter(|e| e.level == Level::ERROR).collect();

        assert_eq!(warnings.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(warnings[0].field("attempt"), Some("1"));
        assert_eq!(warnings[1].field("delay_ms"), Some("100"));
        assert_eq!(errors[0].field("attempts"), Some("3"));
    }
}
