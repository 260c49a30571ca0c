//! Chunk credit counter
//!
//! One counter per directional channel, owned by the sending side. Sending
//! a message takes as many credits as it has chunks; the receiver hands
//! them back after consuming it. At every point
//! `available + issued - freed == initial`.

use crate::error::{ChanioError, ChanioResult};
use leap_core::kwarn;

use std::sync::{Condvar, Mutex};

#[derive(Debug)]
struct Credits {
    initial: u32,
    available: u32,
    issued: u64,
    freed: u64,
    closed: bool,
}

#[derive(Debug)]
pub struct CreditCounter {
    state: Mutex<Credits>,
    returned: Condvar,
}

impl CreditCounter {
    pub fn new(initial: u32) -> Self {
        Self {
            state: Mutex::new(Credits {
                initial,
                available: initial,
                issued: 0,
                freed: 0,
                closed: false,
            }),
            returned: Condvar::new(),
        }
    }

    /// Take `n` credits, blocking until they are available.
    ///
    /// Fails at once if `n` exceeds the whole budget, or when the counter
    /// is closed while waiting.
    pub fn acquire(&self, n: u32) -> ChanioResult<()> {
        let mut s = self.state.lock().unwrap();
        if n > s.initial {
            return Err(ChanioError::TooLarge { chunks: n, credits: s.initial });
        }
        loop {
            if s.closed {
                return Err(ChanioError::Closed);
            }
            if s.available >= n {
                s.available -= n;
                s.issued += n as u64;
                return Ok(());
            }
            s = self.returned.wait(s).unwrap();
        }
    }

    /// Take `n` credits if they are available right now
    pub fn try_acquire(&self, n: u32) -> bool {
        let mut s = self.state.lock().unwrap();
        if s.closed || s.available < n {
            return false;
        }
        s.available -= n;
        s.issued += n as u64;
        true
    }

    /// Return `n` credits; returns how many were accepted. More than are in
    /// flight is clamped so the budget never grows.
    pub fn free(&self, n: u32) -> u32 {
        let mut s = self.state.lock().unwrap();
        let in_flight = s.initial - s.available;
        let accepted = n.min(in_flight);
        if accepted < n {
            kwarn!("credit: {} freed with only {} in flight", n, in_flight);
        }
        s.available += accepted;
        s.freed += accepted as u64;
        if accepted > 0 {
            self.returned.notify_all();
        }
        accepted
    }

    /// Wake blocked `acquire` calls with `Closed`
    pub fn close(&self) {
        let mut s = self.state.lock().unwrap();
        s.closed = true;
        self.returned.notify_all();
    }

    pub fn initial(&self) -> u32 {
        self.state.lock().unwrap().initial
    }

    pub fn available(&self) -> u32 {
        self.state.lock().unwrap().available
    }

    pub fn in_flight(&self) -> u32 {
        let s = self.state.lock().unwrap();
        s.initial - s.available
    }

    /// Total credits ever taken
    pub fn issued(&self) -> u64 {
        self.state.lock().unwrap().issued
    }

    /// Total credits ever returned
    pub fn freed(&self) -> u64 {
        self.state.lock().unwrap().freed
    }

    /// Consistent view of the counters for invariant checks
    pub fn is_conserved(&self) -> bool {
        let s = self.state.lock().unwrap();
        s.available as u64 + s.issued - s.freed == s.initial as u64
            && s.issued - s.freed == (s.initial - s.available) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_acquire_and_free() {
        let c = CreditCounter::new(4);
        assert!(c.try_acquire(3));
        assert!(!c.try_acquire(2));
        assert_eq!(c.in_flight(), 3);
        assert_eq!(c.free(2), 2);
        assert!(c.try_acquire(2));
        assert_eq!((c.issued(), c.freed(), c.available()), (5, 2, 1));
        assert!(c.is_conserved());
    }

    #[test]
    fn test_over_free_is_clamped() {
        let c = CreditCounter::new(2);
        assert!(c.try_acquire(1));
        assert_eq!(c.free(5), 1);
        assert_eq!(c.available(), 2);
        assert!(c.is_conserved());
    }

    #[test]
    fn test_too_large_fails_fast() {
        let c = CreditCounter::new(2);
        assert_eq!(c.acquire(3), Err(ChanioError::TooLarge { chunks: 3, credits: 2 }));
    }

    #[test]
    fn test_blocked_acquire_wakes_on_free_and_close() {
        let c = Arc::new(CreditCounter::new(1));
        c.acquire(1).unwrap();

        let waiter = {
            let c = Arc::clone(&c);
            thread::spawn(move || c.acquire(1))
        };
        thread::sleep(Duration::from_millis(20));
        c.free(1);
        assert_eq!(waiter.join().unwrap(), Ok(()));

        let waiter = {
            let c = Arc::clone(&c);
            thread::spawn(move || c.acquire(1))
        };
        thread::sleep(Duration::from_millis(20));
        c.close();
        assert_eq!(waiter.join().unwrap(), Err(ChanioError::Closed));
    }

    #[test]
    fn test_randomized_conservation() {
        let c = CreditCounter::new(16);
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as u32
        };
        for _ in 0..5_000 {
            let n = next() % 6;
            if next() % 2 == 0 {
                c.try_acquire(n);
            } else {
                c.free(n);
            }
            assert!(c.is_conserved());
            assert!(c.available() <= c.initial());
        }
    }
}
