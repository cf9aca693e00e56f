//! Fixed-size worker pool for index builds.
//!
//! Jobs are queued FIFO and run on dedicated threads, separate from the
//! threads that insert and search. Dropping the pool drains the queue and
//! joins every worker.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::VectorError;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    job_ready: Condvar,
}

pub(crate) struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one).
    pub(crate) fn new(size: usize) -> Result<Self, VectorError> {
        let shared = Arc::new(Shared::default());
        let mut workers = Vec::with_capacity(size.max(1));
        for i in 0..size.max(1) {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("kestrel-build-{i}"))
                .spawn(move || worker_loop(&shared))
                .map_err(|e| VectorError::BuildFailed(format!("failed to spawn build worker: {e}")))?;
            workers.push(handle);
        }
        debug!(workers = workers.len(), "started build worker pool");
        Ok(Self { shared, workers })
    }

    pub(crate) fn size(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn execute(&self, job: Job) -> Result<(), VectorError> {
        let mut state = self.shared.state.lock().map_err(|_| VectorError::LockPoisoned)?;
        if state.shutdown {
            return Err(VectorError::BuildCancelled);
        }
        state.jobs.push_back(job);
        drop(state);
        self.shared.job_ready.notify_one();
        Ok(())
    }

    /// Jobs waiting for a worker.
    pub(crate) fn queued(&self) -> usize {
        self.shared.state.lock().map(|s| s.jobs.len()).unwrap_or(0)
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let Ok(mut state) = shared.state.lock() else {
                return;
            };
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break job;
                }
                if state.shutdown {
                    return;
                }
                state = match shared.job_ready.wait(state) {
                    Ok(state) => state,
                    Err(_) => return,
                };
            }
        };
        job();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.shutdown = true;
        }
        self.shared.job_ready.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("build worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("workers", &self.workers.len()).finish_non_exhaustive()
    }
}
