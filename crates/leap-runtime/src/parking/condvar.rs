//! Portable parking on `std::sync::Condvar`

use super::IdleParking;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub struct CondvarParking {
    /// Wake epoch
    epoch: Mutex<u64>,
    condvar: Condvar,
    parked: AtomicUsize,
}

impl CondvarParking {
    pub fn new() -> Self {
        Self {
            epoch: Mutex::new(0),
            condvar: Condvar::new(),
            parked: AtomicUsize::new(0),
        }
    }

    fn bump(&self) -> bool {
        if self.parked.load(Ordering::SeqCst) == 0 {
            return false;
        }
        *self.epoch.lock().unwrap() += 1;
        true
    }
}

impl Default for CondvarParking {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleParking for CondvarParking {
    fn park(&self, timeout: Option<Duration>, has_work: &dyn Fn() -> bool) -> bool {
        self.parked.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.epoch.lock().unwrap();
        let seen = *guard;

        let woken = if has_work() {
            false
        } else {
            let deadline = timeout.map(|t| Instant::now() + t);
            loop {
                if *guard != seen {
                    break true;
                }
                match deadline {
                    None => guard = self.condvar.wait(guard).unwrap(),
                    Some(deadline) => {
                        let now = Instant::now();
                        if now >= deadline {
                            break false;
                        }
                        guard = self.condvar.wait_timeout(guard, deadline - now).unwrap().0;
                    }
                }
            }
        };

        drop(guard);
        self.parked.fetch_sub(1, Ordering::SeqCst);
        woken
    }

    fn wake_one(&self) {
        if self.bump() {
            self.condvar.notify_one();
        }
    }

    fn wake_all(&self) {
        if self.bump() {
            self.condvar.notify_all();
        }
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
