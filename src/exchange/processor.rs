//! # Processor Loop
//!
//! Long-lived loop that takes messages from a [`MessageSource`] and
//! dispatches them to a [`MessageHandler`], until it takes the
//! [`ProcessorSignal::Shutdown`] sentinel or the owning service goes
//! inactive.
//!
//! The sentinel is a variant of the channel element type, so no payload can
//! be mistaken for it.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Barrier, Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::error::CommandError;
use crate::execution::WorkerPool;

/// Element type of a processor queue
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorSignal<T> {
    Payload(T),
    /// Last message: the loop exits when it takes this
    Shutdown,
}

/// Blocking source of processor signals
#[async_trait]
pub trait MessageSource<T>: Send {
    /// Wait for the next signal; a closed source yields `Shutdown`
    async fn take(&mut self) -> ProcessorSignal<T>;
}

/// Producer side of a processor queue
#[async_trait]
pub trait MessageSink<T>: Send + Sync {
    /// Enqueue a payload, handing it back if the queue is closed
    async fn offer(&self, message: T) -> Result<(), T>;

    /// Enqueue the shutdown sentinel; false if the queue is closed
    async fn offer_shutdown(&self) -> bool;
}

#[async_trait]
pub trait MessageHandler<T>: Send + Sync {
    async fn handle(&self, message: T);
}

/// In-memory bounded queue
pub fn channel<T: Send + 'static>(capacity: usize) -> (ChannelSink<T>, ChannelSource<T>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ChannelSink { sender }, ChannelSource { receiver })
}

#[derive(Debug)]
pub struct ChannelSink<T> {
    sender: mpsc::Sender<ProcessorSignal<T>>,
}

impl<T> Clone for ChannelSink<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> MessageSink<T> for ChannelSink<T> {
    async fn offer(&self, message: T) -> Result<(), T> {
        match self.sender.reserve().await {
            Ok(permit) => {
                permit.send(ProcessorSignal::Payload(message));
                Ok(())
            }
            Err(_) => Err(message),
        }
    }

    async fn offer_shutdown(&self) -> bool {
        self.sender.send(ProcessorSignal::Shutdown).await.is_ok()
    }
}

#[derive(Debug)]
pub struct ChannelSource<T> {
    receiver: mpsc::Receiver<ProcessorSignal<T>>,
}

#[async_trait]
impl<T: Send + 'static> MessageSource<T> for ChannelSource<T> {
    async fn take(&mut self) -> ProcessorSignal<T> {
        self.receiver.recv().await.unwrap_or(ProcessorSignal::Shutdown)
    }
}

/// How taken messages are handled
#[derive(Debug, Clone)]
pub enum DispatchMode {
    /// Handled on the loop itself, one at a time
    Inline,
    /// Handed to the pool, fire-and-forget, with at most the backlog limit
    /// of handed-off messages unfinished at once
    Spawned(Arc<WorkerPool>),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProcessorError {
    #[error("Processor {processor} is not accepting messages")]
    Inactive { processor: String },

    #[error("Processor {processor} queue is closed")]
    Closed { processor: String },

    #[error("Processor {processor} is already running")]
    AlreadyRunning { processor: String },
}

impl From<ProcessorError> for CommandError {
    fn from(error: ProcessorError) -> Self {
        CommandError::concurrency(error.to_string())
    }
}

/// A message `accept` could not enqueue, returned to the caller
#[derive(Debug)]
pub struct Rejected<T> {
    pub message: T,
    pub error: ProcessorError,
}

impl<T> fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

pub struct Processor<T> {
    name: String,
    sink: Arc<dyn MessageSink<T>>,
    source: Mutex<Option<Box<dyn MessageSource<T>>>>,
    handler: Arc<dyn MessageHandler<T>>,
    dispatch: DispatchMode,
    service_active: Arc<AtomicBool>,
    accepting: AtomicBool,
    status: watch::Sender<bool>,
    processed: Arc<AtomicU64>,
    backlog: Arc<Semaphore>,
}

impl<T: Send + 'static> Processor<T> {
    /// Processor over an in-memory queue of `capacity`
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        handler: Arc<dyn MessageHandler<T>>,
        dispatch: DispatchMode,
        service_active: Arc<AtomicBool>,
    ) -> Self {
        let (sink, source) = channel(capacity);
        Self::with_queue(
            name,
            Arc::new(sink),
            Box::new(source),
            handler,
            dispatch,
            service_active,
        )
        .with_backlog_limit(capacity)
    }

    /// Processor over any source/sink pair, e.g. a broker or a test double
    ///
    /// Spawned dispatch is unbounded until [`Processor::with_backlog_limit`]
    /// sets a limit.
    pub fn with_queue(
        name: impl Into<String>,
        sink: Arc<dyn MessageSink<T>>,
        source: Box<dyn MessageSource<T>>,
        handler: Arc<dyn MessageHandler<T>>,
        dispatch: DispatchMode,
        service_active: Arc<AtomicBool>,
    ) -> Self {
        let (status, _) = watch::channel(false);
        Self {
            name: name.into(),
            sink,
            source: Mutex::new(Some(source)),
            handler,
            dispatch,
            service_active,
            accepting: AtomicBool::new(false),
            status,
            processed: Arc::new(AtomicU64::new(0)),
            backlog: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
        }
    }

    /// Cap the messages handed to the pool and not yet handled
    ///
    /// Once the cap is reached the loop stops taking from the queue, so
    /// producers block in `accept` instead of piling up pool tasks.
    pub fn with_backlog_limit(mut self, limit: usize) -> Self {
        self.backlog = Arc::new(Semaphore::new(limit.clamp(1, Semaphore::MAX_PERMITS)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        *self.status.borrow()
    }

    /// Messages handled so far
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    pub fn subscribe_status(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }

    /// Wait until the loop reports active; false on timeout
    pub async fn wait_until_active(&self, timeout: Duration) -> bool {
        let mut status = self.status.subscribe();
        let active = matches!(
            tokio::time::timeout(timeout, status.wait_for(|active| *active)).await,
            Ok(Ok(_))
        );
        active
    }

    /// Run the loop until the sentinel is taken
    ///
    /// With a start barrier, the loop waits on it after activating so a
    /// supervisor can block until every processor has started.
    pub async fn run(&self, start_barrier: Option<Arc<Barrier>>) -> Result<(), ProcessorError> {
        let Some(mut source) = self.source.lock().await.take() else {
            return Err(ProcessorError::AlreadyRunning {
                processor: self.name.clone(),
            });
        };

        self.activate();
        if let Some(barrier) = start_barrier {
            barrier.wait().await;
        }

        loop {
            if !self.service_active.load(Ordering::Acquire) {
                info!(processor = %self.name, "Service inactive, leaving processor loop");
                break;
            }

            match source.take().await {
                ProcessorSignal::Shutdown => {
                    debug!(processor = %self.name, "Took shutdown signal");
                    break;
                }
                ProcessorSignal::Payload(message) => self.dispatch(message).await,
            }
        }

        self.deactivate();
        Ok(())
    }

    /// Enqueue a message for handling
    pub async fn accept(&self, message: T) -> Result<(), Rejected<T>> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(Rejected {
                message,
                error: ProcessorError::Inactive {
                    processor: self.name.clone(),
                },
            });
        }

        self.sink.offer(message).await.map_err(|message| Rejected {
            message,
            error: ProcessorError::Closed {
                processor: self.name.clone(),
            },
        })
    }

    /// Stop accepting, enqueue the sentinel and wait for the loop to exit
    ///
    /// Returns false when the loop was still active at the deadline.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.accepting.store(false, Ordering::Release);
        if !self.is_active() {
            return true;
        }

        info!(processor = %self.name, "Shutting down processor");
        let mut status = self.status.subscribe();
        let stopped = tokio::time::timeout(timeout, async {
            if !self.sink.offer_shutdown().await {
                debug!(processor = %self.name, "Queue already closed");
            }
            status.wait_for(|active| !*active).await.is_ok()
        })
        .await
        .unwrap_or(false);

        if stopped {
            info!(processor = %self.name, processed = self.processed_count(), "Processor stopped");
        } else {
            warn!(
                processor = %self.name,
                timeout_ms = timeout.as_millis() as u64,
                "Processor did not stop in time"
            );
        }
        stopped
    }

    async fn dispatch(&self, message: T) {
        match &self.dispatch {
            DispatchMode::Inline => {
                self.handler.handle(message).await;
                self.processed.fetch_add(1, Ordering::AcqRel);
            }
            DispatchMode::Spawned(pool) => {
                let handler = Arc::clone(&self.handler);
                let processed = Arc::clone(&self.processed);
                // The backlog semaphore is never closed
                let permit = Arc::clone(&self.backlog).acquire_owned().await.ok();
                let (message_slot, task_slot) = split_slot(message);
                let spawned = pool.spawn(async move {
                    let _permit = permit;
                    if let Some(message) = task_slot.take() {
                        handler.handle(message).await;
                        processed.fetch_add(1, Ordering::AcqRel);
                    }
                });

                if let Err(error) = spawned {
                    warn!(
                        processor = %self.name,
                        error = %error,
                        "Pool refused message, handling inline"
                    );
                    if let Some(message) = message_slot.take() {
                        self.handler.handle(message).await;
                        self.processed.fetch_add(1, Ordering::AcqRel);
                    }
                }
            }
        }
    }

    fn activate(&self) {
        self.accepting.store(true, Ordering::Release);
        self.status.send_replace(true);
        info!(processor = %self.name, "Processor active");
    }

    fn deactivate(&self) {
        self.accepting.store(false, Ordering::Release);
        self.status.send_replace(false);
        info!(processor = %self.name, "Processor inactive");
    }
}

/// One message shared by the spawned task and the inline fallback; whoever
/// takes it first handles it.
struct MessageSlot<T>(Arc<parking_lot::Mutex<Option<T>>>);

impl<T> Clone for MessageSlot<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> MessageSlot<T> {
    fn take(&self) -> Option<T> {
        self.0.lock().take()
    }
}

fn split_slot<T>(message: T) -> (MessageSlot<T>, MessageSlot<T>) {
    let slot = MessageSlot(Arc::new(parking_lot::Mutex::new(Some(message))));
    (slot.clone(), slot)
}

impl<T: Send + 'static> fmt::Debug for Processor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .field("processed", &self.processed_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;

    struct Collecting(Arc<SyncMutex<Vec<u32>>>);

    #[async_trait]
    impl MessageHandler<u32> for Collecting {
        async fn handle(&self, message: u32) {
            self.0.lock().push(message);
        }
    }

    fn processor(seen: &Arc<SyncMutex<Vec<u32>>>) -> Arc<Processor<u32>> {
        Arc::new(Processor::new(
            "numbers",
            16,
            Arc::new(Collecting(Arc::clone(seen))),
            DispatchMode::Inline,
            Arc::new(AtomicBool::new(true)),
        ))
    }

    #[tokio::test]
    async fn test_accept_rejected_before_start() {
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let processor = processor(&seen);

        let rejected = processor.accept(7).await.unwrap_err();
        assert_eq!(rejected.message, 7);
        assert!(matches!(rejected.error, ProcessorError::Inactive { .. }));
    }

    #[tokio::test]
    async fn test_processes_in_order_then_stops() {
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let processor = processor(&seen);

        let runner = Arc::clone(&processor);
        let handle = tokio::spawn(async move { runner.run(None).await });
        assert!(processor.wait_until_active(Duration::from_secs(1)).await);

        for n in 1..=3 {
            processor.accept(n).await.unwrap();
        }
        assert!(processor.shutdown(Duration::from_secs(1)).await);
        handle.await.unwrap().unwrap();

        assert_eq!(*seen.lock(), vec![1, 2, 3]);
        assert_eq!(processor.processed_count(), 3);
        assert!(!processor.is_active());
        assert!(processor.accept(4).await.is_err());
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let processor = processor(&seen);

        let runner = Arc::clone(&processor);
        let handle = tokio::spawn(async move { runner.run(None).await });
        assert!(processor.wait_until_active(Duration::from_secs(1)).await);

        assert!(matches!(
            processor.run(None).await,
            Err(ProcessorError::AlreadyRunning { .. })
        ));

        processor.shutdown(Duration::from_secs(1)).await;
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_queued_sentinel_ends_loop_after_payloads() {
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let (sink, source) = channel::<u32>(4);
        let processor = Processor::with_queue(
            "closing",
            Arc::new(sink.clone()),
            Box::new(source),
            Arc::new(Collecting(Arc::clone(&seen))),
            DispatchMode::Inline,
            Arc::new(AtomicBool::new(true)),
        );

        sink.offer(1).await.unwrap();
        assert!(sink.offer_shutdown().await);
        sink.offer(2).await.unwrap();

        processor.run(None).await.unwrap();
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_wait_until_active_times_out_when_never_started() {
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let processor = processor(&seen);

        assert!(!processor.wait_until_active(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_closed_queue_hands_message_back() {
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let (sink, source) = channel::<u32>(4);
        let processor = Processor::with_queue(
            "dropped",
            Arc::new(sink),
            Box::new(source),
            Arc::new(Collecting(Arc::clone(&seen))),
            DispatchMode::Inline,
            Arc::new(AtomicBool::new(true)),
        );

        // Accepting, but the receiving end is gone
        processor.activate();
        drop(processor.source.lock().await.take());

        let rejected = processor.accept(9).await.unwrap_err();
        assert_eq!(rejected.message, 9);
        assert!(matches!(rejected.error, ProcessorError::Closed { .. }));
        assert!(!processor.sink.offer_shutdown().await);
    }

    #[tokio::test]
    async fn test_spawned_dispatch_hands_message_to_pool() {
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let pool = Arc::new(WorkerPool::new("numbers-pool", 2));
        let processor = Arc::new(Processor::new(
            "spawned",
            4,
            Arc::new(Collecting(Arc::clone(&seen))),
            DispatchMode::Spawned(Arc::clone(&pool)),
            Arc::new(AtomicBool::new(true)),
        ));

        let runner = Arc::clone(&processor);
        let handle = tokio::spawn(async move { runner.run(None).await });
        assert!(processor.wait_until_active(Duration::from_secs(1)).await);

        processor.accept(5).await.unwrap();
        assert!(processor.shutdown(Duration::from_secs(1)).await);
        handle.await.unwrap().unwrap();
        pool.shutdown(Duration::from_secs(1)).await.unwrap();

        assert_eq!(*seen.lock(), vec![5]);
    }

    struct Gated {
        gate: Arc<Semaphore>,
        handled: Arc<AtomicU64>,
    }

    #[async_trait]
    impl MessageHandler<u32> for Gated {
        async fn handle(&self, _message: u32) {
            let _pass = self.gate.acquire().await;
            self.handled.fetch_add(1, Ordering::AcqRel);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_spawned_dispatch_is_bounded_by_backlog() {
        let gate = Arc::new(Semaphore::new(0));
        let handled = Arc::new(AtomicU64::new(0));
        let pool = Arc::new(WorkerPool::new("gated-pool", 1));
        let processor = Arc::new(Processor::new(
            "gated",
            2,
            Arc::new(Gated {
                gate: Arc::clone(&gate),
                handled: Arc::clone(&handled),
            }),
            DispatchMode::Spawned(Arc::clone(&pool)),
            Arc::new(AtomicBool::new(true)),
        ));

        let runner = Arc::clone(&processor);
        let handle = tokio::spawn(async move { runner.run(None).await });
        assert!(processor.wait_until_active(Duration::from_secs(1)).await);

        // Two handed off, one held by the loop, two queued
        for n in 0..5 {
            tokio::time::timeout(Duration::from_secs(1), processor.accept(n))
                .await
                .unwrap()
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(pool.in_flight(), 2);

        gate.add_permits(16);
        assert!(processor.shutdown(Duration::from_secs(1)).await);
        handle.await.unwrap().unwrap();
        pool.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(handled.load(Ordering::Acquire), 5);
    }
}
