use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use futures::channel::oneshot;

use crate::error::{ExecutorError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A pool of worker threads that runs handler chains off the I/O reactor.
///
/// - Workers are spawned on demand up to a maximum count
/// - Idle workers exit after the keep-alive duration
/// - Jobs are queued in submission order and handed to notified idle workers
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

/// State shared between the executor handle and its worker threads.
struct Inner {
    /// Duration a worker thread waits for new jobs before shutting down
    keep_alive: Duration,
    shared: Mutex<Shared>,
    max_workers: usize,
    condvar: Condvar,
}

struct Shared {
    queue: VecDeque<Job>,
    /// Current number of worker threads
    workers: usize,
    /// Number of idle worker threads
    idle: usize,
    /// Number of idle workers that have been notified of new work
    notified: usize,
}

impl Executor {
    /// Creates a new executor.
    ///
    /// # Arguments
    /// * `max_workers` - Optional maximum number of worker threads. Defaults to 15 * CPU cores
    /// * `keep_alive` - Optional duration workers wait for new jobs. Defaults to 6 seconds
    pub fn new(max_workers: Option<usize>, keep_alive: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    queue: VecDeque::new(),
                    workers: 0,
                    idle: 0,
                    notified: 0,
                }),
                condvar: Condvar::new(),
                keep_alive: keep_alive.unwrap_or_else(|| Duration::from_secs(6)),
                max_workers: max_workers.unwrap_or_else(|| num_cpus::get() * 15).max(1),
            }),
        }
    }

    /// Queues `job` and returns a receiver for its result.
    ///
    /// The receiver resolves to `Canceled` if the job panicked or could not be queued.
    pub fn run<F, R>(&self, job: F) -> oneshot::Receiver<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job = Box::new(move || {
            // the caller may have gone away; the result is simply dropped then
            let _ = tx.send(job());
        });

        if let Err(e) = self.submit(job) {
            log::error!("Failed to execute job: {}", e);
        }
        rx
    }

    /// Pushes a job onto the queue, waking an idle worker or spawning a new one.
    fn submit(&self, job: Job) -> Result<()> {
        let mut shared = self
            .inner
            .shared
            .lock()
            .map_err(|_| ExecutorError::LockPoisoned)?;

        shared.queue.push_back(job);

        if shared.idle == 0 && shared.workers < self.inner.max_workers {
            shared.workers += 1;
            if let Err(e) = self.spawn_worker() {
                shared.workers -= 1;
                return Err(e);
            }
        } else if shared.idle > 0 {
            shared.idle -= 1;
            shared.notified += 1;
            self.inner.condvar.notify_one();
        }
        Ok(())
    }

    /// Spawns a new worker thread that will process jobs from the queue.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned.
    fn spawn_worker(&self) -> Result<()> {
        let inner = self.inner.clone();
        std::thread::Builder::new()
            .name("thicket-worker".to_owned())
            .spawn(move || {
                if let Err(e) = inner.run() {
                    log::error!("Worker thread error: {}", e);
                }
            })
            .map_err(ExecutorError::ThreadSpawn)?;
        Ok(())
    }
}

impl Inner {
    /// Main worker loop.
    ///
    /// Drains the queue, then waits on the condition variable and exits once
    /// the keep-alive elapses without a notification.
    ///
    /// # Errors
    /// Returns an error if the mutex is poisoned.
    fn run(&self) -> Result<()> {
        let mut shared = self
            .shared
            .lock()
            .map_err(|_| ExecutorError::LockPoisoned)?;

        'alive: loop {
            while let Some(job) = shared.queue.pop_front() {
                drop(shared);
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    log::error!("Job panicked on worker thread");
                }
                shared = self
                    .shared
                    .lock()
                    .map_err(|_| ExecutorError::LockPoisoned)?;
            }

            shared.idle += 1;

            loop {
                let (guard, timeout) = self
                    .condvar
                    .wait_timeout(shared, self.keep_alive)
                    .map_err(|_| ExecutorError::LockPoisoned)?;
                shared = guard;

                if shared.notified != 0 {
                    shared.notified -= 1;
                    continue 'alive;
                }

                if timeout.timed_out() {
                    break 'alive;
                }
            }
        }

        shared.workers -= 1;
        shared.idle -= 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Tests that an executor is created with the correct configuration parameters.
    #[test]
    fn test_executor_creation() {
        let executor = Executor::new(Some(4), Some(Duration::from_secs(10)));
        assert_eq!(executor.inner.max_workers, 4);
        assert_eq!(executor.inner.keep_alive, Duration::from_secs(10));
    }

    /// Tests that a queued job runs and its result is delivered.
    #[test]
    fn test_job_result() {
        let executor = Executor::new(None, None);
        let rx = executor.run(|| 40 + 2);
        assert_eq!(futures::executor::block_on(rx), Ok(42));
    }

    /// Tests that more jobs than workers all complete.
    #[test]
    fn test_jobs_beyond_worker_count() {
        let executor = Executor::new(Some(2), Some(Duration::from_millis(200)));
        let counter = Arc::new(AtomicUsize::new(0));

        let receivers: Vec<_> = (0..16)
            .map(|_| {
                let counter = counter.clone();
                executor.run(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        for rx in receivers {
            futures::executor::block_on(rx).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
        assert!(executor.inner.shared.lock().unwrap().workers <= 2);
    }

    /// Tests that a panicking job cancels its receiver without killing the worker.
    #[test]
    fn test_panicking_job() {
        let executor = Executor::new(Some(1), None);
        let failed = executor.run(|| -> u8 { panic!("boom") });
        assert!(futures::executor::block_on(failed).is_err());

        let ok = executor.run(|| "still serving");
        assert_eq!(futures::executor::block_on(ok), Ok("still serving"));
    }
}
