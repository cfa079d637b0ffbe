//! One cooperative ticker for every periodic maintenance job.
//!
//! Jobs run one after another on a single tokio task, so none of them can
//! overlap with itself or with another job. A job that panics is logged and
//! rescheduled; the loop keeps going.

use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error};

/// Interval used to re-check a job whose interval is currently zero.
const DISABLED_RECHECK: Duration = Duration::from_secs(1);

type IntervalFn = Box<dyn Fn() -> Duration + Send>;
type JobFn = Box<dyn FnMut() + Send>;

struct Job {
    name: &'static str,
    interval: IntervalFn,
    run: JobFn,
    next_due: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub runs: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    runs: AtomicU64,
    failures: AtomicU64,
}

/// Collects jobs before the ticker starts.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `job` to run every `interval()`.
    ///
    /// The interval is re-read after each run, so it can follow config
    /// changes. A zero interval pauses the job.
    #[must_use]
    pub fn every(
        mut self,
        name: &'static str,
        interval: impl Fn() -> Duration + Send + 'static,
        job: impl FnMut() + Send + 'static,
    ) -> Self {
        let first = interval();
        self.jobs.push(Job {
            name,
            next_due: Instant::now() + if first.is_zero() { DISABLED_RECHECK } else { first },
            interval: Box::new(interval),
            run: Box::new(job),
        });
        self
    }

    /// Spawns the ticker on the current runtime.
    pub fn start(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());
        let job_count = self.jobs.len();
        let task = tokio::spawn(run_loop(self.jobs, stop_rx, Arc::clone(&counters)));
        debug!(jobs = job_count, "Scheduler started");

        SchedulerHandle {
            stop: stop_tx,
            task: Mutex::new(Some(task)),
            counters,
        }
    }
}

async fn run_loop(mut jobs: Vec<Job>, mut stop: watch::Receiver<bool>, counters: Arc<Counters>) {
    if jobs.is_empty() {
        let _ = stop.wait_for(|stopped| *stopped).await;
        return;
    }

    loop {
        let next_due = jobs
            .iter()
            .map(|job| job.next_due)
            .min()
            .unwrap_or_else(|| Instant::now() + DISABLED_RECHECK);

        tokio::select! {
            _ = stop.wait_for(|stopped| *stopped) => break,
            () = tokio::time::sleep_until(next_due) => {}
        }

        let now = Instant::now();
        for job in jobs.iter_mut().filter(|job| job.next_due <= now) {
            let interval = (job.interval)();
            if interval.is_zero() {
                job.next_due = now + DISABLED_RECHECK;
                continue;
            }

            counters.runs.fetch_add(1, Ordering::Relaxed);
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(&mut job.run)) {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(job = job.name, error = %message, "Scheduled job panicked");
            }
            job.next_due = Instant::now() + (job.interval)();
        }
    }
    debug!("Scheduler stopped");
}

/// Running ticker. Dropping the handle also stops it.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl SchedulerHandle {
    /// Stops the ticker after the job currently running, if any.
    pub async fn shutdown(&self) {
        self.stop.send_replace(true);
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!(error = %e, "Scheduler task ended abnormally");
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            runs: self.counters.runs.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}
