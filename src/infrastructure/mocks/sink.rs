//! Sinks that record or reject what the dispatch queue hands them.

use crate::application::lock;
use crate::application::ports::{Sink, SinkError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Sink that keeps every item it receives.
///
/// Clones share the same record, so a test can keep one handle while the
/// queue owns another.
#[derive(Debug)]
pub struct RecordingSink<T> {
    items: Arc<Mutex<Vec<T>>>,
    closes: Arc<AtomicUsize>,
    late: Arc<AtomicUsize>,
}

impl<T> Clone for RecordingSink<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            closes: Arc::clone(&self.closes),
            late: Arc::clone(&self.late),
        }
    }
}

impl<T: Clone> RecordingSink<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(AtomicUsize::new(0)),
            late: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Items received so far, in delivery order.
    pub fn items(&self) -> Vec<T> {
        lock(&self.items).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    /// How many times `close` was called.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Items that arrived after the sink was closed.
    pub fn late_count(&self) -> usize {
        self.late.load(Ordering::SeqCst)
    }
}

impl<T: Clone> Default for RecordingSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Sink<T> for RecordingSink<T> {
    fn emit(&self, item: T) -> Result<(), SinkError> {
        if self.closes.load(Ordering::SeqCst) > 0 {
            self.late.fetch_add(1, Ordering::SeqCst);
        }
        lock(&self.items).push(item);
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sink that rejects everything.
#[derive(Debug, Clone, Default)]
pub struct FailingSink {
    attempts: Arc<AtomicUsize>,
}

impl FailingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many items were offered.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl<T> Sink<T> for FailingSink {
    fn emit(&self, _item: T) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::new("sink unavailable"))
    }
}
