//! Linux futex-based parking
//!
//! The futex word is the wake epoch. A parking worker samples it, re-checks
//! for work, then `FUTEX_WAIT`s on the sampled value; the kernel refuses to
//! sleep if a waker bumped the epoch in between.

use super::IdleParking;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

pub struct FutexParking {
    epoch: AtomicU32,
    parked: AtomicUsize,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            epoch: AtomicU32::new(0),
            parked: AtomicUsize::new(0),
        }
    }

    fn wake(&self, count: i32) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.parked.load(Ordering::SeqCst) == 0 {
            return;
        }
        // SAFETY: the futex word outlives the call; no timeout or second
        // address is passed for FUTEX_WAKE.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.epoch.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                count,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleParking for FutexParking {
    fn park(&self, timeout: Option<Duration>, has_work: &dyn Fn() -> bool) -> bool {
        self.parked.fetch_add(1, Ordering::SeqCst);
        let seen = self.epoch.load(Ordering::SeqCst);
        if has_work() {
            self.parked.fetch_sub(1, Ordering::SeqCst);
            return false;
        }

        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // SAFETY: the futex word and the timespec live across the call.
        // FUTEX_WAIT returns immediately if the word no longer equals `seen`.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.epoch.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                seen,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            )
        };
        self.parked.fetch_sub(1, Ordering::SeqCst);

        // EAGAIN means the epoch moved before we slept, which is a wake too
        rc == 0
            || std::io::Error::last_os_error().raw_os_error() == Some(libc::EAGAIN)
            || self.epoch.load(Ordering::SeqCst) != seen
    }

    fn wake_one(&self) {
        self.wake(1);
    }

    fn wake_all(&self) {
        self.wake(i32::MAX);
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
