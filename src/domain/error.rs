//! Configuration errors.
//!
//! Every component validates its parameters at construction time. Invalid
//! values are reported here, never at call time.

use std::fmt;
use std::time::Duration;

/// Error returned when a component is constructed with invalid parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Rate limit is negative or outside the supported range
    InvalidRateLimit(i64),
    /// Sliding window duration must be greater than zero
    ZeroWindow,
    /// Cache TTL must be greater than zero
    ZeroTtl,
    /// Ring or queue capacity must be greater than zero
    ZeroCapacity,
    /// Backoff factor must be finite and at least 1.0
    InvalidBackoffFactor(f64),
    /// Retry count exceeds the supported maximum
    TooManyRetries(u32),
    /// Initial retry delay outside the supported range
    DelayOutOfRange(Duration),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidRateLimit(limit) => {
                write!(f, "invalid rate limit {}: expected 1..=10000 or none", limit)
            }
            ConfigError::ZeroWindow => write!(f, "admission window must be greater than 0"),
            ConfigError::ZeroTtl => write!(f, "cache ttl must be greater than 0"),
            ConfigError::ZeroCapacity => write!(f, "capacity must be greater than 0"),
            ConfigError::InvalidBackoffFactor(factor) => {
                write!(f, "backoff factor {} must be finite and >= 1.0", factor)
            }
            ConfigError::TooManyRetries(retries) => {
                write!(f, "max_retries {} exceeds the limit of 10", retries)
            }
            ConfigError::DelayOutOfRange(delay) => {
                write!(f, "retry delay {:?} must be at most 60s", delay)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ConfigError::InvalidRateLimit(-1).to_string(),
            "invalid rate limit -1: expected 1..=10000 or none"
        );
        assert_eq!(
            ConfigError::ZeroCapacity.to_string(),
            "capacity must be greater than 0"
        );
        assert!(ConfigError::InvalidBackoffFactor(f64::NAN)
            .to_string()
            .contains("NaN"));
    }
}
