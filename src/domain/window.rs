//! Fixed-capacity FIFO ring for metric records.

use crate::domain::error::ConfigError;
use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// Ring holding the most recent `capacity` records.
///
/// Insertion never fails: once full, each push evicts the oldest record.
///
/// ```
/// use crm_resilience::MetricWindow;
///
/// let mut window = MetricWindow::new(2).unwrap();
/// assert_eq!(window.push(1), None);
/// assert_eq!(window.push(2), None);
/// assert_eq!(window.push(3), Some(1));
/// assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct MetricWindow<T> {
    capacity: usize,
    records: VecDeque<T>,
}

impl<T> MetricWindow<T> {
    /// Create an empty ring.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroCapacity` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        NonZeroUsize::new(capacity)
            .map(Self::with_capacity)
            .ok_or(ConfigError::ZeroCapacity)
    }

    /// Create an empty ring from a capacity already known to be non-zero.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            capacity: capacity.get(),
            records: VecDeque::with_capacity(capacity.get()),
        }
    }

    /// Append a record, returning the evicted one if the ring was full.
    pub fn push(&mut self, record: T) -> Option<T> {
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        evicted
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
