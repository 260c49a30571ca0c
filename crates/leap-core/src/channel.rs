//! Latency-insensitive half-channels
//!
//! A SEND (`LiSend`) and a RECV (`LiRecv`) become a channel once they share
//! a `BoundedQueue`. Wiring happens either through the name matcher during
//! elaboration or through an explicit `connect`.
//!
//! A SEND owns a fan-out list of queues: connecting one SEND to several
//! RECVs gives each RECV its own queue and every value is enqueued on all
//! of them (multicast). Several SENDs connected to one RECV share that
//! RECV's queue (merge). Each queue still has exactly one consumer.
//!
//! Unconnected endpoints degrade instead of failing: an unconnected SEND
//! drops values, an unconnected RECV reports empty. Both log a diagnostic
//! the first time it happens.

use crate::error::TryPushError;
use crate::queue::BoundedQueue;
use crate::spinlock::SpinLock;
use crate::{kdebug, kerror, kwarn};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Default depth of a freshly allocated channel queue (`LINC_QUEUE_DEPTH`)
pub const LINC_QUEUE_DEPTH: usize = 16;

pub(crate) struct SendLink<T> {
    pub(crate) name: String,
    fanout: SpinLock<Vec<Arc<BoundedQueue<T>>>>,
    warned: AtomicBool,
}

pub(crate) struct RecvLink<T> {
    pub(crate) name: String,
    queue: OnceLock<Arc<BoundedQueue<T>>>,
    warned: AtomicBool,
}

impl<T> SendLink<T> {
    fn new(name: String) -> Self {
        Self { name, fanout: SpinLock::new(Vec::new()), warned: AtomicBool::new(false) }
    }

    fn is_connected(&self) -> bool {
        !self.fanout.lock().is_empty()
    }

    fn feeds(&self, queue: &Arc<BoundedQueue<T>>) -> bool {
        self.fanout.lock().iter().any(|q| Arc::ptr_eq(q, queue))
    }

    fn attach(&self, queue: Arc<BoundedQueue<T>>) {
        self.fanout.lock().push(queue);
    }
}

impl<T> RecvLink<T> {
    fn new(name: String) -> Self {
        Self { name, queue: OnceLock::new(), warned: AtomicBool::new(false) }
    }
}

/// How a `connect` call wired the two endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectKind {
    /// Neither side was connected; a new queue was allocated
    Direct,
    /// SEND already fed other RECVs; the RECV got its own queue in the fan-out
    Multicast,
    /// RECV already had producers; the SEND joined its queue
    Merge,
    /// Both sides were connected already; nothing changed
    AlreadyConnected,
}

/// Wire a SEND to a RECV.
///
/// Never fails: connecting two already-connected endpoints is logged as an
/// error and otherwise ignored.
pub fn connect<T>(send: &LiSend<T>, recv: &LiRecv<T>, depth: usize) -> ConnectKind {
    link(&send.link, &recv.link, depth)
}

pub(crate) fn link<T>(send: &SendLink<T>, recv: &RecvLink<T>, depth: usize) -> ConnectKind {
    match (send.is_connected(), recv.queue.get()) {
        (true, Some(queue)) => {
            if send.feeds(queue) {
                kdebug!("connect: '{}' -> '{}' already wired", send.name, recv.name);
            } else {
                kerror!(
                    "connect: '{}' and '{}' are both connected elsewhere; ignoring",
                    send.name, recv.name
                );
            }
            ConnectKind::AlreadyConnected
        }
        (false, Some(queue)) => {
            send.attach(Arc::clone(queue));
            ConnectKind::Merge
        }
        (sending, None) => {
            let queue = Arc::new(BoundedQueue::new(depth));
            let queue = Arc::clone(recv.queue.get_or_init(|| queue));
            send.attach(queue);
            if sending {
                ConnectKind::Multicast
            } else {
                ConnectKind::Direct
            }
        }
    }
}

/// Producer half of an LI channel
pub struct LiSend<T> {
    pub(crate) link: Arc<SendLink<T>>,
}

impl<T> LiSend<T> {
    /// An unconnected SEND; wire it with `connect` or the matcher
    pub fn new(name: impl Into<String>) -> Self {
        Self { link: Arc::new(SendLink::new(name.into())) }
    }

    pub fn name(&self) -> &str {
        &self.link.name
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Number of RECV queues this SEND feeds
    pub fn fanout(&self) -> usize {
        self.link.fanout.lock().len()
    }

    /// True when every queue in the fan-out has room. An unconnected SEND
    /// is never full (its values are dropped).
    pub fn not_full(&self) -> bool {
        self.link.fanout.lock().iter().all(|q| !q.is_full())
    }
}

impl<T: Clone> LiSend<T> {
    /// Enqueue `value` on every connected RECV.
    ///
    /// Blocks the calling thread if a queue is full; guard the rule with
    /// `not_full()` first.
    pub fn enq(&self, value: T) {
        let queues = self.link.fanout.lock().clone();
        let Some((last, rest)) = queues.split_last() else {
            self.warn_dangling();
            return;
        };
        for q in rest {
            q.push(value.clone());
        }
        last.push(value);
    }

    /// Enqueue only if every queue has room; otherwise hand the value back.
    /// Never blocks: a slot is claimed in each queue first, and all claims
    /// are dropped if any queue is full.
    pub fn try_enq(&self, value: T) -> Result<(), TryPushError<T>> {
        let queues = self.link.fanout.lock().clone();
        if queues.is_empty() {
            self.warn_dangling();
            return Ok(());
        }
        let mut slots = Vec::with_capacity(queues.len());
        for q in &queues {
            match q.try_reserve() {
                Some(slot) => slots.push(slot),
                None => return Err(TryPushError(value)),
            }
        }
        let Some(last) = slots.pop() else {
            return Err(TryPushError(value));
        };
        for slot in slots {
            slot.fill(value.clone());
        }
        last.fill(value);
        Ok(())
    }

    fn warn_dangling(&self) {
        if !self.link.warned.swap(true, Ordering::Relaxed) {
            kwarn!("SEND '{}' is not connected; dropping values", self.link.name);
        }
    }
}

impl<T> std::fmt::Debug for LiSend<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiSend")
            .field("name", &self.link.name)
            .field("fanout", &self.fanout())
            .finish()
    }
}

/// Consumer half of an LI channel, with a one-element peek buffer
pub struct LiRecv<T> {
    pub(crate) link: Arc<RecvLink<T>>,
    head: SpinLock<Option<T>>,
}

impl<T> LiRecv<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            link: Arc::new(RecvLink::new(name.into())),
            head: SpinLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.link.name
    }

    pub fn is_connected(&self) -> bool {
        self.link.queue.get().is_some()
    }

    /// True if a value is available, pulling one into the peek buffer
    pub fn not_empty(&self) -> bool {
        let mut head = self.head.lock();
        if head.is_none() {
            *head = self.queue().and_then(|q| q.try_pop());
        }
        head.is_some()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.not_empty()
    }

    /// Remove and return the next value, `None` if nothing is queued
    pub fn deq(&self) -> Option<T> {
        if let Some(v) = self.head.lock().take() {
            return Some(v);
        }
        self.queue().and_then(|q| q.try_pop())
    }

    /// Blocking receive for code running outside a module task.
    /// Returns `None` on timeout.
    pub fn deq_timeout(&self, timeout: Duration) -> Option<T> {
        if let Some(v) = self.head.lock().take() {
            return Some(v);
        }
        match self.queue() {
            Some(q) => q.pop_timeout(timeout),
            None => {
                std::thread::sleep(timeout);
                None
            }
        }
    }

    fn queue(&self) -> Option<&Arc<BoundedQueue<T>>> {
        let q = self.link.queue.get();
        if q.is_none() && !self.link.warned.swap(true, Ordering::Relaxed) {
            kwarn!("RECV '{}' is not connected; it will never produce values", self.link.name);
        }
        q
    }
}

impl<T: Clone> LiRecv<T> {
    /// Copy of the next value without consuming it
    pub fn peek(&self) -> Option<T> {
        if self.not_empty() {
            self.head.lock().clone()
        } else {
            None
        }
    }
}

impl<T> std::fmt::Debug for LiRecv<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiRecv")
            .field("name", &self.link.name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Convenience: build and connect an unnamed SEND/RECV pair
pub fn li_channel<T>(name: &str, depth: usize) -> (LiSend<T>, LiRecv<T>) {
    let send = LiSend::new(name);
    let recv = LiRecv::new(name);
    connect(&send, &recv, depth);
    (send, recv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_connect_fifo() {
        let (tx, rx) = li_channel::<u32>("x", 4);
        assert!(tx.is_connected() && rx.is_connected());
        tx.enq(1);
        tx.enq(2);
        assert_eq!(rx.peek(), Some(1));
        assert_eq!(rx.deq(), Some(1));
        assert_eq!(rx.deq(), Some(2));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_multicast_both_receivers_see_everything() {
        let tx = LiSend::<u32>::new("fan");
        let a = LiRecv::new("a");
        let b = LiRecv::new("b");
        assert_eq!(connect(&tx, &a, 8), ConnectKind::Direct);
        assert_eq!(connect(&tx, &b, 8), ConnectKind::Multicast);
        assert_eq!(tx.fanout(), 2);

        for v in [1, 2, 3] {
            tx.enq(v);
        }
        let drain = |r: &LiRecv<u32>| std::iter::from_fn(|| r.deq()).collect::<Vec<_>>();
        assert_eq!(drain(&a), vec![1, 2, 3]);
        assert_eq!(drain(&b), vec![1, 2, 3]);
    }

    #[test]
    fn test_merge_shares_receiver_queue() {
        let t1 = LiSend::<u8>::new("t1");
        let t2 = LiSend::<u8>::new("t2");
        let rx = LiRecv::new("rx");
        assert_eq!(connect(&t1, &rx, 4), ConnectKind::Direct);
        assert_eq!(connect(&t2, &rx, 4), ConnectKind::Merge);
        t1.enq(1);
        t2.enq(2);
        assert_eq!(rx.deq(), Some(1));
        assert_eq!(rx.deq(), Some(2));
    }

    #[test]
    fn test_double_connect_is_ignored() {
        let (tx, rx) = li_channel::<u8>("dup", 4);
        assert_eq!(connect(&tx, &rx, 4), ConnectKind::AlreadyConnected);
        assert_eq!(tx.fanout(), 1);
    }

    #[test]
    fn test_unconnected_endpoints_degrade() {
        let tx = LiSend::<u8>::new("nowhere");
        assert!(tx.not_full());
        tx.enq(5);
        assert!(tx.try_enq(6).is_ok());

        let rx = LiRecv::<u8>::new("nothing");
        assert!(rx.is_empty());
        assert_eq!(rx.deq(), None);
        assert_eq!(rx.peek(), None);
    }

    #[test]
    fn test_try_enq_full_returns_value() {
        let (tx, rx) = li_channel::<u8>("small", 1);
        tx.try_enq(1).unwrap();
        assert!(!tx.not_full());
        assert_eq!(tx.try_enq(2), Err(TryPushError(2)));
        assert_eq!(rx.deq(), Some(1));
        assert!(tx.not_full());
    }

    #[test]
    fn test_merged_producers_never_block() {
        let rx = LiRecv::<u32>::new("merged");
        let a = LiSend::<u32>::new("a");
        let b = LiSend::<u32>::new("b");
        assert_eq!(connect(&a, &rx, 4), ConnectKind::Direct);
        assert_eq!(connect(&b, &rx, 4), ConnectKind::Merge);

        // Both producers race on one four-slot queue nobody drains
        let producers: Vec<_> = [a, b]
            .into_iter()
            .map(|tx| {
                std::thread::spawn(move || {
                    (0..100u32).filter(|&i| tx.try_enq(i).is_ok()).count()
                })
            })
            .collect();
        let accepted: usize = producers.into_iter().map(|p| p.join().unwrap()).sum();
        assert_eq!(accepted, 4);

        let mut got = 0;
        while rx.deq().is_some() {
            got += 1;
        }
        assert_eq!(got, 4);
    }

    #[test]
    fn test_multicast_try_enq_is_all_or_nothing() {
        let tx = LiSend::<u8>::new("fan");
        let (r1, r2) = (LiRecv::<u8>::new("r1"), LiRecv::<u8>::new("r2"));
        connect(&tx, &r1, 2);
        assert_eq!(connect(&tx, &r2, 1), ConnectKind::Multicast);

        tx.try_enq(1).unwrap();
        // r2 is full, so r1 must not see the value either
        assert_eq!(tx.try_enq(2), Err(TryPushError(2)));
        assert_eq!(r1.deq(), Some(1));
        assert_eq!(r1.deq(), None);
        assert_eq!(r2.deq(), Some(1));
        tx.try_enq(3).unwrap();
        assert_eq!((r1.deq(), r2.deq()), (Some(3), Some(3)));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let (tx, rx) = li_channel::<u8>("p", 2);
        tx.enq(9);
        assert_eq!(rx.peek(), Some(9));
        assert_eq!(rx.peek(), Some(9));
        assert!(!rx.is_empty());
        assert_eq!(rx.deq(), Some(9));
        assert!(rx.is_empty());
    }
}
