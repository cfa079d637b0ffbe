use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::priority::{PendingTask, Priority};
use crate::error::QueueError;

/// Work a pool worker performs for each task.
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    /// Translates `text`; never fails, falling back to `text` itself.
    async fn run(&self, text: &str) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub pool_size: usize,
    pub poll_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_size: 4,
            poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub queued_by_priority: BTreeMap<Priority, usize>,
    pub completed: u64,
    pub failed: u64,
    pub active_workers: usize,
    pub workers: usize,
}

/// Result of a submitted task.
///
/// Resolves once a worker settles the task, or with [`QueueError::Closed`]
/// if the queue goes away first.
#[derive(Debug)]
pub struct TaskHandle {
    rx: oneshot::Receiver<Result<String, QueueError>>,
}

impl TaskHandle {
    fn ready(result: Result<String, QueueError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Blocks the current thread until the task settles.
    ///
    /// Must not be called from inside the async runtime.
    pub fn wait_blocking(self) -> Result<String, QueueError> {
        self.rx.blocking_recv().unwrap_or(Err(QueueError::Closed))
    }
}

impl Future for TaskHandle {
    type Output = Result<String, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(QueueError::Closed)))
    }
}

/// Priority queue drained by a fixed pool of worker tasks.
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<Reverse<PendingTask>>>,
    notify: Notify,
    closed: AtomicBool,
    seq: AtomicU64,
    settings: PoolSettings,
    workers: Mutex<Vec<JoinHandle<()>>>,
    active: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl TaskQueue {
    /// Creates an empty queue with no workers.
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            settings,
            workers: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    fn heap(&self) -> MutexGuard<'_, BinaryHeap<Reverse<PendingTask>>> {
        self.heap.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Spawns `settings.pool_size` workers running tasks through `runner`.
    pub fn start(self: &Arc<Self>, runner: Arc<dyn TaskRunner>) {
        let mut workers = self
            .workers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for id in 0..self.settings.pool_size.max(1) {
            let queue = Arc::clone(self);
            let runner = Arc::clone(&runner);
            workers.push(tokio::spawn(async move { queue.worker_loop(id, runner).await }));
        }
        debug!(workers = workers.len(), "Worker pool started");
    }

    /// Queues `text` for translation.
    ///
    /// Blank text settles immediately with itself.
    pub fn submit(
        &self,
        text: &str,
        priority: Priority,
        category: Option<&str>,
    ) -> Result<TaskHandle, QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        if text.trim().is_empty() {
            return Ok(TaskHandle::ready(Ok(text.to_string())));
        }

        let (reply, rx) = oneshot::channel();
        let task = PendingTask {
            priority,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            text: text.to_string(),
            category: category.map(str::to_string),
            reply,
        };

        {
            let mut heap = self.heap();
            // Re-checked under the lock so shutdown's drain cannot miss a task.
            if self.is_closed() {
                return Err(QueueError::Closed);
            }
            heap.push(Reverse(task));
        }
        self.notify.notify_one();
        Ok(TaskHandle { rx })
    }

    fn pop(&self) -> Option<PendingTask> {
        self.heap().pop().map(|Reverse(task)| task)
    }

    async fn worker_loop(self: Arc<Self>, id: usize, runner: Arc<dyn TaskRunner>) {
        loop {
            if let Some(task) = self.pop() {
                self.execute(id, runner.as_ref(), task).await;
                continue;
            }
            if self.is_closed() {
                break;
            }
            // Bounded so a missed wakeup only costs one poll interval.
            let _ = tokio::time::timeout(self.settings.poll_interval, self.notify.notified()).await;
        }
        debug!(worker = id, "Worker stopped");
    }

    async fn execute(&self, worker: usize, runner: &dyn TaskRunner, task: PendingTask) {
        self.active.fetch_add(1, Ordering::Relaxed);
        let outcome = AssertUnwindSafe(runner.run(&task.text)).catch_unwind().await;
        self.active.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Ok(translated) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                task.settle(Ok(translated));
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(worker, priority = %task.priority, error = %message, "Translation task panicked");
                self.failed.fetch_add(1, Ordering::Relaxed);
                task.settle(Err(QueueError::TaskFailed(message)));
            }
        }
    }

    /// Fails every queued task of `category` with [`QueueError::Cancelled`].
    pub fn cancel_category(&self, category: &str) -> usize {
        let cancelled: Vec<PendingTask> = {
            let mut heap = self.heap();
            let (matching, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *heap)
                .into_iter()
                .partition(|Reverse(task)| task.category.as_deref() == Some(category));
            *heap = kept.into_iter().collect();
            matching.into_iter().map(|Reverse(task)| task).collect()
        };

        let count = cancelled.len();
        for task in cancelled {
            task.settle(Err(QueueError::Cancelled));
        }
        if count > 0 {
            debug!(category, count, "Cancelled queued tasks");
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> QueueStats {
        let mut queued_by_priority: BTreeMap<Priority, usize> =
            Priority::ALL.iter().map(|&p| (p, 0)).collect();
        let queued = {
            let heap = self.heap();
            for Reverse(task) in heap.iter() {
                *queued_by_priority.entry(task.priority).or_default() += 1;
            }
            heap.len()
        };

        QueueStats {
            queued,
            queued_by_priority,
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            active_workers: self.active.load(Ordering::Relaxed),
            workers: self
                .workers
                .lock()
                .map_or(0, |workers| workers.iter().filter(|w| !w.is_finished()).count()),
        }
    }

    /// Stops accepting tasks, fails queued ones and joins the workers.
    ///
    /// Workers still busy after the shutdown timeout are aborted.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained: Vec<PendingTask> = {
            let mut heap = self.heap();
            std::mem::take(&mut *heap)
                .into_iter()
                .map(|Reverse(task)| task)
                .collect()
        };
        let drained_count = drained.len();
        for task in drained {
            task.settle(Err(QueueError::Closed));
        }
        self.notify.notify_waiters();

        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        let deadline = tokio::time::Instant::now() + self.settings.shutdown_timeout;
        for mut worker in workers {
            if tokio::time::timeout_at(deadline, &mut worker).await.is_err() {
                warn!("Worker did not stop in time, aborting");
                worker.abort();
            }
        }
        debug!(drained = drained_count, "Task queue shut down");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}
