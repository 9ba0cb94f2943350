//! Non-blocking hand-off to a slow sink.
//!
//! `AsyncDispatchQueue` puts a bounded queue and one background worker
//! between producers and a synchronous [`Sink`]. When the queue is full it
//! either drops the new item or, after waiting up to a timeout, emits it on
//! the producer's thread so nothing is lost.

use crate::application::{lock, read, write};
use crate::application::metrics::DispatchMetrics;
use crate::application::ports::Sink;
use crate::domain::error::ConfigError;
use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Target of the events the queue and its worker emit.
pub(crate) const DISPATCH_TARGET: &str = module_path!();

/// Queue configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum number of queued items
    pub capacity: usize,
    /// Drop new items when full instead of waiting and emitting inline
    pub drop_on_full: bool,
    /// How long `submit` waits for space before emitting inline
    pub block_timeout: Duration,
    /// How often the worker checks for a stop request while idle
    pub poll_interval: Duration,
    /// How long `stop` waits for the worker before abandoning it
    pub join_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            drop_on_full: true,
            block_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl DispatchConfig {
    /// Default configuration with a custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn drop_on_full(mut self, drop_on_full: bool) -> Self {
        self.drop_on_full = drop_on_full;
        self
    }

    pub fn block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// # Errors
    /// Returns `ConfigError::ZeroCapacity` if `capacity` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

/// What happened to a submitted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued for the background worker
    Queued,
    /// Discarded because the queue was full or closed
    Dropped,
    /// Emitted synchronously on the caller's thread
    EmittedInline,
}

struct Worker {
    stop: Arc<AtomicBool>,
    /// Disconnects when the worker thread exits
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Bounded queue drained into a sink by one background thread.
///
/// The worker starts lazily on the first `submit`. Items from a single
/// producer reach the sink in submission order.
///
/// Dropping the queue closes it: queued items are flushed to the sink and the
/// sink is closed, which may block for up to `join_timeout` while the worker
/// finishes its current item.
///
/// # Example
/// ```
/// use crm_resilience::{AsyncDispatchQueue, DispatchConfig, FnSink, SubmitOutcome};
/// use std::sync::{Arc, Mutex, RwLock};
///
/// let lines = Arc::new(Mutex::new(Vec::new()));
/// let sink_lines = Arc::clone(&lines);
/// let sink = FnSink::new(move |line: String| {
///     sink_lines.lock().unwrap().push(line);
///     Ok(())
/// });
///
/// let queue = AsyncDispatchQueue::new(sink, DispatchConfig::default()).unwrap();
/// assert_eq!(queue.submit("hello".to_string()), SubmitOutcome::Queued);
/// queue.close();
///
/// assert_eq!(*lines.lock().unwrap(), vec!["hello".to_string()]);
/// ```
pub struct AsyncDispatchQueue<T: Send + 'static> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    sink: Arc<dyn Sink<T>>,
    config: DispatchConfig,
    metrics: DispatchMetrics,
    worker: Mutex<Option<Worker>>,
    /// Submits hold the read side from the closed check through the send
    closed: RwLock<bool>,
}

impl<T: Send + 'static> AsyncDispatchQueue<T> {
    /// Wrap `sink` in a queue.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroCapacity` if the configured capacity is zero.
    pub fn new<S>(sink: S, config: DispatchConfig) -> Result<Self, ConfigError>
    where
        S: Sink<T> + 'static,
    {
        Self::with_shared_sink(Arc::new(sink), config)
    }

    /// Wrap a sink that is also used elsewhere.
    pub fn with_shared_sink(
        sink: Arc<dyn Sink<T>>,
        config: DispatchConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (sender, receiver) = bounded(config.capacity);
        Ok(Self {
            sender,
            receiver,
            sink,
            config,
            metrics: DispatchMetrics::new(),
            worker: Mutex::new(None),
            closed: RwLock::new(false),
        })
    }

    /// Hand an item to the queue.
    ///
    /// Never blocks under the drop policy. Under the block policy, waits up
    /// to `block_timeout` for space and then emits the item on this thread.
    /// Items submitted after `close` are dropped.
    pub fn submit(&self, item: T) -> SubmitOutcome {
        self.metrics.record_submitted();

        // Held until the item is queued or emitted, so `close` cannot flush
        // in between and strand it
        let closed = read(&self.closed);
        if *closed {
            self.metrics.record_dropped();
            return SubmitOutcome::Dropped;
        }

        if let Err(e) = self.spawn_worker() {
            warn!(error = %e, "Failed to start dispatch worker, emitting inline");
            return self.emit_inline(item);
        }

        if self.config.drop_on_full {
            match self.sender.try_send(item) {
                Ok(()) => SubmitOutcome::Queued,
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                    self.metrics.record_dropped();
                    SubmitOutcome::Dropped
                }
            }
        } else {
            match self.sender.send_timeout(item, self.config.block_timeout) {
                Ok(()) => SubmitOutcome::Queued,
                Err(SendTimeoutError::Timeout(item))
                | Err(SendTimeoutError::Disconnected(item)) => self.emit_inline(item),
            }
        }
    }

    fn emit_inline(&self, item: T) -> SubmitOutcome {
        self.metrics.record_emitted_inline();
        deliver(self.sink.as_ref(), item, &self.metrics);
        SubmitOutcome::EmittedInline
    }

    /// Start the background worker if it is not already running.
    ///
    /// # Errors
    /// Returns the OS error if the thread could not be spawned, or an error
    /// if the queue is closed.
    pub fn start(&self) -> io::Result<()> {
        let closed = read(&self.closed);
        if *closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "dispatch queue is closed",
            ));
        }
        self.spawn_worker()
    }

    // Callers hold the read side of `closed`
    fn spawn_worker(&self) -> io::Result<()> {
        let mut worker = lock(&self.worker);
        if worker
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
        {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded::<()>(0);
        let receiver = self.receiver.clone();
        let sink = Arc::clone(&self.sink);
        let metrics = self.metrics.clone();
        let poll_interval = self.config.poll_interval;
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("dispatch-worker".to_string())
            .spawn(move || {
                let _done = done_tx;
                run_worker(&receiver, sink.as_ref(), &metrics, &stop_flag, poll_interval);
            })?;

        debug!(capacity = self.config.capacity, "Dispatch worker started");
        *worker = Some(Worker {
            stop,
            done: done_rx,
            handle,
        });
        Ok(())
    }

    /// Signal the worker to stop and wait up to `join_timeout` for it.
    ///
    /// Items still queued stay queued. Returns `false` if the worker did not
    /// exit in time and was abandoned.
    pub fn stop(&self) -> bool {
        let Some(worker) = lock(&self.worker).take() else {
            return true;
        };

        worker.stop.store(true, Ordering::Release);
        match worker.done.recv_timeout(self.config.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    warn!("Dispatch worker panicked");
                }
                debug!("Dispatch worker stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.config.join_timeout.as_millis() as u64,
                    "Dispatch worker did not stop in time, abandoning it"
                );
                false
            }
        }
    }

    /// Stop the worker, flush queued items to the sink and close the sink.
    ///
    /// Later submits are dropped. Calling `close` again has no effect.
    pub fn close(&self) {
        {
            let mut closed = write(&self.closed);
            if *closed {
                return;
            }
            *closed = true;
        }

        self.stop();

        let mut flushed = 0usize;
        while let Ok(item) = self.receiver.try_recv() {
            deliver(self.sink.as_ref(), item, &self.metrics);
            flushed += 1;
        }

        let sink = Arc::clone(&self.sink);
        if panic::catch_unwind(AssertUnwindSafe(|| sink.close())).is_err() {
            warn!("Sink panicked while closing");
        }
        debug!(flushed, "Dispatch queue closed");
    }

    /// Items waiting in the queue.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    pub fn is_closed(&self) -> bool {
        *read(&self.closed)
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

impl<T: Send + 'static> Drop for AsyncDispatchQueue<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Send + 'static> fmt::Debug for AsyncDispatchQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDispatchQueue")
            .field("config", &self.config)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

fn run_worker<T>(
    receiver: &Receiver<T>,
    sink: &dyn Sink<T>,
    metrics: &DispatchMetrics,
    stop: &AtomicBool,
    poll_interval: Duration,
) {
    while !stop.load(Ordering::Acquire) {
        match receiver.recv_timeout(poll_interval) {
            Ok(item) => {
                deliver(sink, item, metrics);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Emit one item, absorbing sink errors and panics.
fn deliver<T>(sink: &dyn Sink<T>, item: T, metrics: &DispatchMetrics) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| sink.emit(item))) {
        Ok(Ok(())) => {
            metrics.record_delivered();
            true
        }
        Ok(Err(e)) => {
            metrics.record_sink_failure();
            debug!(error = %e, "Sink rejected item");
            false
        }
        Err(_) => {
            metrics.record_sink_failure();
            debug!("Sink panicked while emitting item");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::SinkError;
    use crate::infrastructure::mocks::{FailingSink, RecordingSink};
    use crossbeam_channel::unbounded;
    use std::time::Instant;

    /// Sink that blocks on item 1 until released and reports when it gets it.
    struct GatedSink {
        entered: Sender<()>,
        release: Receiver<()>,
        recorded: RecordingSink<u32>,
    }

    impl Sink<u32> for GatedSink {
        fn emit(&self, item: u32) -> Result<(), SinkError> {
            if item == 1 {
                let _ = self.entered.send(());
                let _ = self.release.recv();
            }
            self.recorded.emit(item)
        }
    }

    fn gated() -> (GatedSink, Receiver<()>, Sender<()>, RecordingSink<u32>) {
        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        let recorded = RecordingSink::new();
        let sink = GatedSink {
            entered: entered_tx,
            release: release_rx,
            recorded: recorded.clone(),
        };
        (sink, entered_rx, release_tx, recorded)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result =
            AsyncDispatchQueue::new(RecordingSink::<u32>::new(), DispatchConfig::with_capacity(0));
        assert!(matches!(result, Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn test_lazy_start() {
        let sink = RecordingSink::new();
        let queue = AsyncDispatchQueue::new(sink.clone(), DispatchConfig::default()).unwrap();
        assert!(!queue.is_running());

        queue.submit(7u32);
        assert!(queue.is_running());

        wait_until(|| sink.len() == 1);
        assert!(queue.stop());
        assert!(!queue.is_running());
    }

    #[test]
    fn test_single_producer_order_preserved() {
        let sink = RecordingSink::new();
        let config = DispatchConfig::with_capacity(16).drop_on_full(false);
        let queue = AsyncDispatchQueue::new(sink.clone(), config).unwrap();

        for i in 0..200u32 {
            queue.submit(i);
        }
        queue.close();

        assert_eq!(sink.items(), (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_drop_policy_when_full() {
        let (sink, entered, release, recorded) = gated();
        let queue = AsyncDispatchQueue::new(sink, DispatchConfig::with_capacity(1)).unwrap();

        assert_eq!(queue.submit(1), SubmitOutcome::Queued);
        entered.recv().unwrap();

        // Worker is busy with item 1: one slot left
        assert_eq!(queue.submit(2), SubmitOutcome::Queued);
        assert_eq!(queue.submit(3), SubmitOutcome::Dropped);

        release.send(()).unwrap();
        queue.close();

        assert_eq!(recorded.items(), vec![1, 2]);
        let snapshot = queue.metrics().snapshot();
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.delivered, 2);
    }

    #[test]
    fn test_block_policy_falls_back_to_inline_emit() {
        let (sink, entered, release, recorded) = gated();
        let config = DispatchConfig::with_capacity(1)
            .drop_on_full(false)
            .block_timeout(Duration::from_millis(20));
        let queue = AsyncDispatchQueue::new(sink, config).unwrap();

        assert_eq!(queue.submit(1), SubmitOutcome::Queued);
        entered.recv().unwrap();
        assert_eq!(queue.submit(2), SubmitOutcome::Queued);
        assert_eq!(queue.submit(3), SubmitOutcome::EmittedInline);

        // Inline emit happened while the worker was still blocked
        assert_eq!(recorded.items(), vec![3]);

        release.send(()).unwrap();
        queue.close();

        let mut items = recorded.items();
        items.sort_unstable();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(queue.metrics().emitted_inline(), 1);
    }

    #[test]
    fn test_failing_sink_does_not_kill_worker() {
        let sink = FailingSink::new();
        let queue = AsyncDispatchQueue::new(sink.clone(), DispatchConfig::default()).unwrap();

        for i in 0..5u32 {
            queue.submit(i);
        }
        wait_until(|| queue.metrics().sink_failures() == 5);

        assert!(queue.is_running());
        assert_eq!(sink.attempts(), 5);
        queue.close();
    }

    #[test]
    fn test_panicking_sink_is_contained() {
        let sink = crate::infrastructure::sink::FnSink::new(|item: u32| {
            if item % 2 == 0 {
                panic!("even item");
            }
            Ok(())
        });
        let queue = AsyncDispatchQueue::new(sink, DispatchConfig::default()).unwrap();

        for i in 0..4u32 {
            queue.submit(i);
        }
        queue.close();

        let snapshot = queue.metrics().snapshot();
        assert_eq!(snapshot.delivered, 2);
        assert_eq!(snapshot.sink_failures, 2);
    }

    #[test]
    fn test_submit_after_close_is_dropped() {
        let sink = RecordingSink::new();
        let queue = AsyncDispatchQueue::new(sink.clone(), DispatchConfig::default()).unwrap();
        queue.close();

        assert_eq!(queue.submit(1u32), SubmitOutcome::Dropped);
        assert!(sink.is_closed());
        assert!(sink.items().is_empty());
    }

    #[test]
    fn test_stop_keeps_queued_items_and_restarts_lazily() {
        let (sink, entered, release, recorded) = gated();
        let config = DispatchConfig::with_capacity(4).join_timeout(Duration::from_millis(20));
        let queue = AsyncDispatchQueue::new(sink, config).unwrap();

        queue.submit(1);
        entered.recv().unwrap();
        queue.submit(2);

        // Worker is stuck inside emit, so the join times out
        assert!(!queue.stop());
        assert!(!queue.is_running());
        release.send(()).unwrap();

        // The abandoned worker exits after item 1 and leaves item 2 queued
        wait_until(|| recorded.len() == 1);
        assert_eq!(queue.pending(), 1);

        queue.submit(3);
        queue.close();

        assert_eq!(recorded.items(), vec![1, 2, 3]);
    }

    #[test]
    fn test_start_after_close_fails() {
        let queue =
            AsyncDispatchQueue::new(RecordingSink::<u32>::new(), DispatchConfig::default()).unwrap();
        queue.close();

        assert!(queue.start().is_err());
        assert!(!queue.is_running());
    }

    #[test]
    fn test_close_racing_producers_strands_nothing() {
        for _ in 0..50 {
            let sink = RecordingSink::new();
            let queue = Arc::new(
                AsyncDispatchQueue::new(sink.clone(), DispatchConfig::with_capacity(64)).unwrap(),
            );

            let producers: Vec<_> = (0..4u32)
                .map(|p| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || {
                        for i in 0..200u32 {
                            queue.submit(p * 1000 + i);
                        }
                    })
                })
                .collect();
            thread::sleep(Duration::from_micros(200));
            queue.close();
            for producer in producers {
                producer.join().unwrap();
            }

            let snapshot = queue.metrics().snapshot();
            assert_eq!(snapshot.submitted, 800);
            assert_eq!(snapshot.delivered + snapshot.dropped, 800);
            assert_eq!(sink.len() as u64, snapshot.delivered);
            assert_eq!(sink.late_count(), 0);
            assert_eq!(queue.pending(), 0);
            assert!(!queue.is_running());
        }
    }

    #[test]
    fn test_drop_flushes_and_closes_sink() {
        let (sink, entered, release, recorded) = gated();
        let config = DispatchConfig::with_capacity(8).drop_on_full(false);
        let queue = AsyncDispatchQueue::new(sink, config).unwrap();

        queue.submit(1);
        entered.recv().unwrap();
        queue.submit(2);
        queue.submit(3);
        release.send(()).unwrap();
        drop(queue);

        assert_eq!(recorded.items(), vec![1, 2, 3]);
        assert!(recorded.is_closed());
    }

    #[test]
    fn test_drop_after_close_closes_sink_once() {
        let sink = RecordingSink::new();
        {
            let queue = AsyncDispatchQueue::new(sink.clone(), DispatchConfig::default()).unwrap();
            queue.submit(5u32);
            queue.close();
        }
        assert_eq!(sink.items(), vec![5]);
        assert_eq!(sink.close_count(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let sink = RecordingSink::<u32>::new();
        let queue = AsyncDispatchQueue::new(sink.clone(), DispatchConfig::default()).unwrap();
        queue.close();
        queue.close();
        assert_eq!(sink.close_count(), 1);
    }
}
