//! Bounded Worker Pool
//!
//! Long-lived pool used to launch processors, dispatch message handling and
//! run the members of parallel macro commands. Created once at component
//! start and shut down with the component; never created per call.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::CommandError;

/// Semaphore-bounded pool of tokio tasks
///
/// # Examples
///
/// ```rust
/// use command_core::execution::WorkerPool;
///
/// #[tokio::main]
/// async fn main() {
///     let pool = WorkerPool::new("example", 4);
///     let handle = pool.spawn(async { 21 * 2 }).unwrap();
///     assert_eq!(handle.await.unwrap(), 42);
///     pool.shutdown(std::time::Duration::from_secs(1)).await.unwrap();
/// }
/// ```
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    size: usize,
    permits: Arc<Semaphore>,
    accepting: AtomicBool,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl WorkerPool {
    /// Create a pool running at most `size` tasks at once
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let name = name.into();
        let size = size.max(1);

        info!(pool = %name, size = size, "Worker pool created");

        Self {
            name,
            size,
            permits: Arc::new(Semaphore::new(size)),
            accepting: AtomicBool::new(true),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Size a pool for a macro command: one worker per member, capped at `max_size`
    pub fn for_members(name: impl Into<String>, member_count: usize, max_size: usize) -> Self {
        Self::new(name, member_count.clamp(1, max_size.max(1)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks submitted and not yet finished (running or waiting for a permit)
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Submit a task; it starts once a permit is free
    pub fn spawn<F>(&self, task: F) -> Result<JoinHandle<F::Output>, WorkerPoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if !self.is_accepting() {
            return Err(WorkerPoolError::ShuttingDown {
                pool: self.name.clone(),
            });
        }

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            idle: self.idle.clone(),
        };
        let permits = self.permits.clone();

        Ok(tokio::spawn(async move {
            let _guard = guard;
            // A closed semaphore only happens after draining; run regardless.
            let _permit = permits.acquire_owned().await.ok();
            task.await
        }))
    }

    /// Stop accepting work and wait for in-flight tasks to finish
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), WorkerPoolError> {
        self.accepting.store(false, Ordering::Release);
        info!(pool = %self.name, in_flight = self.in_flight(), "Worker pool shutting down");

        let drained = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    break;
                }
                notified.await;
            }
        })
        .await;

        self.permits.close();

        match drained {
            Ok(()) => {
                info!(pool = %self.name, "Worker pool drained");
                Ok(())
            }
            Err(_) => {
                let remaining = self.in_flight();
                warn!(pool = %self.name, remaining = remaining, "Worker pool shutdown timed out");
                Err(WorkerPoolError::ShutdownTimeout {
                    pool: self.name.clone(),
                    remaining,
                })
            }
        }
    }

    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            name: self.name.clone(),
            size: self.size,
            in_flight: self.in_flight(),
            available_permits: self.permits.available_permits(),
            accepting: self.is_accepting(),
        }
    }
}

/// Decrements the in-flight counter when a task ends, even by panic
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!("Worker pool idle");
            self.idle.notify_waiters();
        }
    }
}

/// Point-in-time pool statistics
#[derive(Debug, Clone)]
pub struct WorkerPoolStats {
    pub name: String,
    pub size: usize,
    pub in_flight: usize,
    pub available_permits: usize,
    pub accepting: bool,
}

/// Worker pool errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerPoolError {
    #[error("Worker pool {pool} is shutting down")]
    ShuttingDown { pool: String },

    #[error("Worker pool {pool} shutdown timed out with {remaining} tasks in flight")]
    ShutdownTimeout { pool: String, remaining: usize },
}

impl From<WorkerPoolError> for CommandError {
    fn from(error: WorkerPoolError) -> Self {
        CommandError::concurrency(error.to_string())
    }
}
