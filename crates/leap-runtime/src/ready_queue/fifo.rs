//! Global FIFO ready queue
//!
//! Lock-free ring sized for the expected task count, with a locked overflow
//! list behind it. Pops drain the ring first; pushes go to the overflow
//! only while it is non-empty or the ring is full, which keeps order FIFO
//! in the common case.

use super::ReadyQueue;
use crate::parking::{new_parking, IdleParking};
use crossbeam_queue::ArrayQueue;
use leap_core::{SpinLock, TaskId};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct FifoQueue {
    ring: ArrayQueue<TaskId>,
    overflow: SpinLock<VecDeque<TaskId>>,
    overflow_len: AtomicUsize,
    parking: Box<dyn IdleParking>,
}

impl FifoQueue {
    /// Queue whose lock-free ring holds `capacity` ids (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self::with_parking(capacity, new_parking())
    }

    pub fn with_parking(capacity: usize, parking: Box<dyn IdleParking>) -> Self {
        Self {
            ring: ArrayQueue::new(capacity.max(1)),
            overflow: SpinLock::new(VecDeque::new()),
            overflow_len: AtomicUsize::new(0),
            parking,
        }
    }

    pub fn parked_count(&self) -> usize {
        self.parking.parked_count()
    }

    fn push_overflow(&self, id: TaskId) {
        let mut q = self.overflow.lock();
        q.push_back(id);
        self.overflow_len.store(q.len(), Ordering::Release);
    }

    fn pop_overflow(&self) -> Option<TaskId> {
        if self.overflow_len.load(Ordering::Acquire) == 0 {
            return None;
        }
        let mut q = self.overflow.lock();
        let id = q.pop_front();
        self.overflow_len.store(q.len(), Ordering::Release);
        id
    }
}

impl ReadyQueue for FifoQueue {
    fn push(&self, id: TaskId) {
        if self.overflow_len.load(Ordering::Acquire) > 0 {
            self.push_overflow(id);
        } else if let Err(id) = self.ring.push(id) {
            self.push_overflow(id);
        }
        self.parking.wake_one();
    }

    fn pop(&self) -> Option<TaskId> {
        self.ring.pop().or_else(|| self.pop_overflow())
    }

    fn park(&self, timeout: Duration) {
        self.parking.park(Some(timeout), &|| !self.is_empty());
    }

    fn wake_one(&self) {
        self.parking.wake_one();
    }

    fn wake_all(&self) {
        self.parking.wake_all();
    }

    fn len(&self) -> usize {
        self.ring.len() + self.overflow_len.load(Ordering::Acquire)
    }
}
