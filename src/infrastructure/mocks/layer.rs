//! Layer that keeps every tracing event so tests can assert on log output.

use crate::application::lock;
use crate::infrastructure::visitor::FieldVisitor;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::Layer;

/// Clones share one event buffer.
#[derive(Debug, Clone)]
pub struct MockCaptureLayer {
    captured: Arc<Mutex<Vec<CapturedEvent>>>,
}

/// One event as seen by [`MockCaptureLayer`], fields rendered to strings.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// A field rendered as a string, if the event carried it.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl MockCaptureLayer {
    pub fn new() -> Self {
        Self {
            captured: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Events in the order they were emitted.
    pub fn get_captured(&self) -> Vec<CapturedEvent> {
        lock(&self.captured).clone()
    }

    /// Captured events at one level.
    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.get_captured()
            .into_iter()
            .filter(|event| event.level == level)
            .collect()
    }

    pub fn count(&self) -> usize {
        lock(&self.captured).len()
    }

    /// Forget everything captured so far.
    ///
    /// # Examples
    ///
    /// ```
    /// use crm_resilience::infrastructure::mocks::MockCaptureLayer;
    /// use tracing::info;
    /// use tracing_subscriber::layer::SubscriberExt;
    ///
    /// let capture = MockCaptureLayer::new();
    /// let subscriber = tracing_subscriber::registry().with(capture.clone());
    ///
    /// tracing::subscriber::with_default(subscriber, || {
    ///     info!(endpoint = "Account", "fetched");
    ///     assert_eq!(capture.count(), 1);
    ///
    ///     capture.clear();
    ///     assert_eq!(capture.count(), 0);
    /// });
    /// ```
    pub fn clear(&self) {
        lock(&self.captured).clear();
    }
}

impl Default for MockCaptureLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for MockCaptureLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);
        let (message, fields) = visitor.into_parts();

        let metadata = event.metadata();
        lock(&self.captured).push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: message.unwrap_or_default(),
            fields,
        });
    }
}
