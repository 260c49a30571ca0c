//! Bounded queue shared by connected LI half-channels
//!
//! Lock-free `ArrayQueue` storage for the non-blocking path; a
//! Mutex/Condvar pair is only touched when a caller actually has to wait.
//!
//! Producers claim a slot before writing it, so several producers can
//! each hold a slot in different queues and commit all of them or none
//! (`try_reserve`).
//!
//! Waiters re-check the queue under the gate lock and wait with a short
//! timeout, so a wakeup racing the waiter registration costs at most one
//! `WAIT_SLICE`.

use crate::error::TryPushError;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

const WAIT_SLICE: Duration = Duration::from_millis(10);

pub struct BoundedQueue<T> {
    slots: ArrayQueue<T>,
    /// Slots holding a value or claimed by a `Reserved`
    claimed: AtomicUsize,
    gate: Mutex<()>,
    not_empty: Condvar,
    not_full: Condvar,
    /// Threads currently blocked in `push`/`pop`
    waiters: AtomicUsize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `depth` values (minimum 1)
    pub fn new(depth: usize) -> Self {
        Self {
            slots: ArrayQueue::new(depth.max(1)),
            claimed: AtomicUsize::new(0),
            gate: Mutex::new(()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), TryPushError<T>> {
        match self.try_reserve() {
            Some(slot) => {
                slot.fill(value);
                Ok(())
            }
            None => Err(TryPushError(value)),
        }
    }

    /// Claim one slot without writing it yet
    pub fn try_reserve(&self) -> Option<Reserved<'_, T>> {
        let cap = self.slots.capacity();
        self.claimed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < cap).then_some(n + 1))
            .ok()
            .map(|_| Reserved { queue: self, live: true })
    }

    fn fill(&self, value: T) {
        // Every claim has room in `slots`; pops release their claim last
        let mut value = value;
        while let Err(back) = self.slots.push(value) {
            value = back;
            std::hint::spin_loop();
        }
        self.notify(&self.not_empty);
    }

    fn release_claim(&self) {
        self.claimed.fetch_sub(1, Ordering::AcqRel);
        self.notify(&self.not_full);
    }

    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let value = self.slots.pop();
        if value.is_some() {
            self.release_claim();
        }
        value
    }

    /// Push, blocking the OS thread while the queue is full
    pub fn push(&self, value: T) {
        let mut value = value;
        loop {
            match self.try_push(value) {
                Ok(()) => return,
                Err(TryPushError(back)) => value = back,
            }
            self.wait_while(&self.not_full, || self.is_full(), WAIT_SLICE);
        }
    }

    /// Pop, blocking the OS thread while the queue is empty
    pub fn pop(&self) -> T {
        loop {
            if let Some(v) = self.try_pop() {
                return v;
            }
            self.wait_while(&self.not_empty, || self.slots.is_empty(), WAIT_SLICE);
        }
    }

    /// Pop, giving up after `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(v) = self.try_pop() {
                return Some(v);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let slice = (deadline - now).min(WAIT_SLICE);
            self.wait_while(&self.not_empty, || self.slots.is_empty(), slice);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True when every slot is taken, counting reserved ones
    #[inline]
    pub fn is_full(&self) -> bool {
        self.claimed.load(Ordering::Acquire) >= self.slots.capacity()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    fn wait_while(&self, cond: &Condvar, blocked: impl Fn() -> bool, slice: Duration) {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let guard = self.gate.lock().unwrap();
        if blocked() {
            let _ = cond.wait_timeout(guard, slice);
        }
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    fn notify(&self, cond: &Condvar) {
        if self.waiters.load(Ordering::SeqCst) > 0 {
            let _guard = self.gate.lock().unwrap();
            cond.notify_all();
        }
    }
}

/// A slot claimed in a `BoundedQueue`. Dropping it unfilled gives the
/// slot back.
pub struct Reserved<'a, T> {
    queue: &'a BoundedQueue<T>,
    live: bool,
}

impl<T> Reserved<'_, T> {
    pub fn fill(mut self, value: T) {
        self.live = false;
        self.queue.fill(value);
    }
}

impl<T> Drop for Reserved<'_, T> {
    fn drop(&mut self) {
        if self.live {
            self.queue.release_claim();
        }
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_and_bounds() {
        let q = BoundedQueue::new(2);
        q.try_push(1).unwrap();
        q.try_push(2).unwrap();
        assert!(q.is_full());
        assert_eq!(q.try_push(3), Err(TryPushError(3)));
        assert_eq!(q.try_pop(), Some(1));
        q.try_push(3).unwrap();
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn test_reserved_slots_count_as_full() {
        let q = BoundedQueue::new(2);
        let a = q.try_reserve().unwrap();
        q.try_push(1).unwrap();
        assert!(q.is_full());
        assert!(q.try_reserve().is_none());
        assert_eq!(q.try_push(2), Err(TryPushError(2)));
        drop(a);
        assert!(!q.is_full());
        q.try_reserve().unwrap().fill(3);
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(3));
        assert!(q.is_empty());
    }

    #[test]
    fn test_zero_depth_is_clamped() {
        let q: BoundedQueue<u8> = BoundedQueue::new(0);
        assert_eq!(q.capacity(), 1);
    }

    #[test]
    fn test_blocking_push_pop_across_threads() {
        let q = Arc::new(BoundedQueue::new(4));
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..1000u32 {
                    q.push(i);
                }
            })
        };
        let mut got = Vec::with_capacity(1000);
        for _ in 0..1000 {
            got.push(q.pop());
        }
        producer.join().unwrap();
        assert_eq!(got, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn test_pop_timeout_expires() {
        let q: BoundedQueue<u8> = BoundedQueue::new(1);
        let start = Instant::now();
        assert_eq!(q.pop_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }
}
