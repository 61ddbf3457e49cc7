//! # ThreadPool — blocking range-partitioned parallel-for
//!
//! A fixed set of worker threads created once by the application driver and
//! never resized. The only operation is [`dispatch`](ThreadPool::dispatch): a
//! parallel-for over an index space with full barrier semantics. This is not
//! a task queue — the caller blocks until every sub-range has finished, so a
//! processor's parallel phase never interleaves with the next processor.
//!
//! ## Partitioning
//!
//! `[0, count)` is split into one contiguous range per worker, remainder
//! distributed to the first workers. Empty ranges are skipped: the job is
//! never invoked with `start == end`, and `count == 0` is a no-op.
//!
//! ## Failure
//!
//! A panicking job does not take down its siblings. The pool waits for every
//! range to finish, then hands the caller a [`WorkerFailure`] aggregating all
//! panic payloads. Writes made by completed ranges are not rolled back.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::error::WorkerFailure;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size worker pool executing range-partitioned parallel jobs.
pub struct ThreadPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

/// Shared per-dispatch completion state.
struct Batch {
    remaining: Mutex<usize>,
    all_done: Condvar,
    panics: Mutex<Vec<String>>,
}

impl Batch {
    fn new(ranges: usize) -> Self {
        Self {
            remaining: Mutex::new(ranges),
            all_done: Condvar::new(),
            panics: Mutex::new(Vec::new()),
        }
    }

    fn range_finished(&self) {
        let mut remaining = self.remaining.lock();
        *remaining -= 1;
        if *remaining == 0 {
            self.all_done.notify_one();
        }
    }

    fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.all_done.wait(&mut remaining);
        }
    }
}

impl ThreadPool {
    /// Create a pool with the given number of workers.
    ///
    /// `threads == 0` means "use all available hardware concurrency minus the
    /// driver thread", clamped to at least one worker.
    pub fn new(threads: usize) -> Self {
        let count = Self::resolve_worker_count(threads);
        log::info!("thread pool: using {count} worker(s)");

        let (sender, receiver) = crossbeam_channel::unbounded::<Task>();
        let workers = (0..count)
            .map(|i| {
                let receiver: Receiver<Task> = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("cadence-worker-{i}"))
                    .spawn(move || {
                        while let Ok(task) = receiver.recv() {
                            task();
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub(crate) fn resolve_worker_count(threads: usize) -> usize {
        if threads > 0 {
            threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1)
        }
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Run `job(start, end)` over `[0, count)`, partitioned across workers.
    ///
    /// Blocks until every sub-range has returned. Ranges are contiguous,
    /// pairwise disjoint, and together cover exactly `[0, count)`; their
    /// relative execution order across workers is unspecified. Empty ranges
    /// are skipped and `count == 0` returns immediately.
    ///
    /// If any range panics, the remaining ranges still run to completion and
    /// the aggregated failure is returned.
    pub fn dispatch<F>(&self, count: usize, job: F) -> Result<(), WorkerFailure>
    where
        F: Fn(usize, usize) + Sync,
    {
        let ranges = partition(count, self.worker_count());
        if ranges.is_empty() {
            return Ok(());
        }

        let job_ref: &(dyn Fn(usize, usize) + Sync) = &job;
        // SAFETY: `wait()` below blocks until every queued task has run to
        // completion, so no worker touches `job_ref` (or anything it borrows)
        // after dispatch returns.
        let job_ref: &'static (dyn Fn(usize, usize) + Sync) =
            unsafe { std::mem::transmute(job_ref) };

        let batch = std::sync::Arc::new(Batch::new(ranges.len()));
        let sender = self
            .sender
            .as_ref()
            .expect("thread pool used after shutdown");

        for (start, end) in ranges {
            let batch = std::sync::Arc::clone(&batch);
            let task: Task = Box::new(move || {
                let result = catch_unwind(AssertUnwindSafe(|| job_ref(start, end)));
                if let Err(payload) = result {
                    batch.panics.lock().push(panic_message(payload.as_ref()));
                }
                batch.range_finished();
            });
            sender.send(task).expect("worker channel closed");
        }

        batch.wait();

        let panics = std::mem::take(&mut *batch.panics.lock());
        if panics.is_empty() {
            Ok(())
        } else {
            Err(WorkerFailure { panics })
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the channel ends every worker's recv loop.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Split `[0, count)` into at most `workers` contiguous ranges, remainder
/// spread over the first ranges. Empty ranges are omitted.
fn partition(count: usize, workers: usize) -> Vec<(usize, usize)> {
    if count == 0 || workers == 0 {
        return Vec::new();
    }
    let base = count / workers;
    let remainder = count % workers;
    let mut ranges = Vec::with_capacity(workers.min(count));
    let mut start = 0;
    for i in 0..workers {
        let len = base + usize::from(i < remainder);
        if len == 0 {
            break;
        }
        ranges.push((start, start + len));
        start += len;
    }
    ranges
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
