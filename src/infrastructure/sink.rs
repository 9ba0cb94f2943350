//! Sink adapters for the dispatch queue.
//!
//! - [`TracingSink`] re-emits [`LogRecord`]s as `tracing` events
//! - [`WriterSink`] writes one line per record to any `io::Write`
//! - [`FnSink`] adapts a closure

use crate::application::lock;
use crate::application::ports::{Sink, SinkError};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::Level;

/// Target of the events `TracingSink` emits.
pub(crate) const TRACING_SINK_TARGET: &str = module_path!();

/// A log record queued for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
    pub timestamp: SystemTime,
}

impl LogRecord {
    pub fn new(level: Level, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            target: target.into(),
            message: message.into(),
            fields: BTreeMap::new(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5} {}: {}", self.level.as_str(), self.target, self.message)?;
        for (key, value) in &self.fields {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Re-emits records through the current `tracing` subscriber.
///
/// The original target is carried in the `origin` field, since `tracing`
/// targets must be known at compile time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl Sink<LogRecord> for TracingSink {
    fn emit(&self, record: LogRecord) -> Result<(), SinkError> {
        let origin = record.target.as_str();
        let fields = &record.fields;
        let message = record.message.as_str();

        match record.level {
            Level::ERROR => tracing::error!(origin, ?fields, "{}", message),
            Level::WARN => tracing::warn!(origin, ?fields, "{}", message),
            Level::INFO => tracing::info!(origin, ?fields, "{}", message),
            Level::DEBUG => tracing::debug!(origin, ?fields, "{}", message),
            _ => tracing::trace!(origin, ?fields, "{}", message),
        }
        Ok(())
    }
}

/// Writes each record as one line.
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<T, W> Sink<T> for WriterSink<W>
where
    T: fmt::Display,
    W: Write + Send,
{
    fn emit(&self, item: T) -> Result<(), SinkError> {
        writeln!(lock(&self.writer), "{}", item).map_err(|e| SinkError::new(e.to_string()))
    }

    fn close(&self) {
        // Nothing to report to: close has no error channel
        let _ = lock(&self.writer).flush();
    }
}

impl<W: Write + Send> fmt::Debug for WriterSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterSink").finish_non_exhaustive()
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F, T> {
    f: F,
    _item: PhantomData<fn(T)>,
}

impl<F, T> FnSink<F, T>
where
    F: Fn(T) -> Result<(), SinkError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _item: PhantomData,
        }
    }
}

impl<F, T> Sink<T> for FnSink<F, T>
where
    F: Fn(T) -> Result<(), SinkError> + Send + Sync,
{
    fn emit(&self, item: T) -> Result<(), SinkError> {
        (self.f)(item)
    }
}

impl<F, T> fmt::Debug for FnSink<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").finish_non_exhaustive()
    }
}
