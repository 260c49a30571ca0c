//! Worker thread management
//!
//! Workers are OS threads that pull module tasks off the ready queue and run
//! one slice at a time. Idle workers spin briefly, then park.

use leap_core::{LeapError, LeapResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Pool of named worker threads sharing one shutdown flag
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    num_workers: usize,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(num_workers: usize) -> Self {
        Self {
            handles: Vec::with_capacity(num_workers),
            num_workers,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start all workers. `worker_fn(id, shutdown)` must return once the
    /// flag is set.
    pub fn start<F>(&mut self, worker_fn: F) -> LeapResult<()>
    where
        F: Fn(usize, &AtomicBool) + Send + Sync + Clone + 'static,
    {
        for i in 0..self.num_workers {
            let worker_fn = worker_fn.clone();
            let shutdown = Arc::clone(&self.shutdown);
            let handle = thread::Builder::new()
                .name(format!("leap-worker-{}", i))
                .spawn(move || {
                    set_current_worker_id(i);
                    worker_fn(i, &shutdown);
                })
                .map_err(|e| {
                    // Let already-started workers exit
                    self.shutdown.store(true, Ordering::Release);
                    LeapError::WorkerSpawn(e.to_string())
                })?;
            self.handles.push(handle);
        }
        Ok(())
    }

    /// Signal shutdown to all workers
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Wait for all workers to finish
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn started(&self) -> usize {
        self.handles.len()
    }
}

thread_local! {
    static CURRENT_WORKER_ID: std::cell::Cell<usize> = const { std::cell::Cell::new(usize::MAX) };
}

pub fn set_current_worker_id(id: usize) {
    CURRENT_WORKER_ID.with(|cell| cell.set(id));
}

/// Index of the worker running the current thread, `None` off-pool
#[inline]
pub fn current_worker_id() -> Option<usize> {
    let id = CURRENT_WORKER_ID.with(|cell| cell.get());
    (id != usize::MAX).then_some(id)
}
