//! Traits the components depend on instead of concrete time, output and
//! storage. Adapters live in `infrastructure`.

use std::fmt::{self, Debug};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Monotonic time source for windows, TTLs and latency.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Port for suspending the calling thread.
///
/// Kept separate from `Clock` so that tests can substitute a sleeper that
/// advances a mock clock instead of blocking.
pub trait Sleeper: Send + Sync + Debug {
    /// Block the caller for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Error reported by a sink that failed to accept an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink error: {}", self.message)
    }
}

impl std::error::Error for SinkError {}

/// Port for a synchronous, possibly slow, downstream consumer.
///
/// `AsyncDispatchQueue` wraps any sink and drains items into it from a
/// background worker.
pub trait Sink<T>: Send + Sync {
    /// Deliver one item.
    fn emit(&self, item: T) -> Result<(), SinkError>;

    /// Release any resources held by the sink.
    fn close(&self) {}
}

/// Concurrent map holding counter state.
///
/// Implementations must make `with_entry_mut` atomic per key: the factory
/// runs at most once for a missing key and the accessor sees every earlier
/// update to that entry.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Run `accessor` on the entry for `key`, inserting `factory()` first if
    /// the key is absent.
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool;

    fn clear(&self);

    /// Visit every entry. Order is unspecified.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);
}

/// Port for extracting an HTTP status code from an operation outcome.
///
/// Implemented by the transport's response and error types so that the
/// resilience facade can classify each attempt.
pub trait StatusCode {
    fn status_code(&self) -> Option<u16>;
}

impl<T: StatusCode> StatusCode for &T {
    fn status_code(&self) -> Option<u16> {
        (**self).status_code()
    }
}

impl StatusCode for u16 {
    fn status_code(&self) -> Option<u16> {
        Some(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_error_display() {
        let err = SinkError::new("disk full");
        assert_eq!(err.message(), "disk full");
        assert_eq!(err.to_string(), "sink error: disk full");
    }

    #[test]
    fn test_status_code_for_u16() {
        assert_eq!(404u16.status_code(), Some(404));
        assert_eq!((&201u16).status_code(), Some(201));
    }
}
