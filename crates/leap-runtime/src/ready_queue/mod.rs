//! Ready queue of runnable module schedulers
//!
//! A task id is in the queue at most once: it is pushed when spawned or
//! when its slice yields, and popped by exactly one worker.
//!
//! # Implementations
//! - `FifoQueue` - single global FIFO with idle parking

mod fifo;

pub use fifo::FifoQueue;

use leap_core::TaskId;
use std::time::Duration;

pub trait ReadyQueue: Send + Sync {
    /// Append a runnable task at the back and wake an idle worker
    fn push(&self, id: TaskId);

    /// Next runnable task, `None` if nothing is queued
    fn pop(&self) -> Option<TaskId>;

    /// Park the calling worker until work arrives or `timeout` elapses
    fn park(&self, timeout: Duration);

    fn wake_one(&self);

    /// Wake all parked workers (shutdown)
    fn wake_all(&self);

    /// Approximate ready count (for diagnostics)
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
