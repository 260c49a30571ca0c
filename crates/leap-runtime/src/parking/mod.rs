//! Idle worker parking
//!
//! A worker with nothing to run parks here instead of spinning. Parking is
//! epoch based: a waker bumps the epoch before signalling, and a worker only
//! sleeps if the epoch it sampled is still current, so a wake issued between
//! "queue looked empty" and "went to sleep" is never lost.

use std::time::Duration;

pub trait IdleParking: Send + Sync {
    /// Park until woken or `timeout` elapses.
    ///
    /// `has_work` is re-checked after the worker registers as parked; if it
    /// returns true the call returns immediately. Returns `true` when woken
    /// by a wake call, `false` on timeout or an early return.
    fn park(&self, timeout: Option<Duration>, has_work: &dyn Fn() -> bool) -> bool;

    fn wake_one(&self);

    fn wake_all(&self);

    /// Number of currently parked workers (hint, may be stale)
    fn parked_count(&self) -> usize;
}

mod condvar;
pub use condvar::CondvarParking;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking;
        pub type PlatformParking = FutexParking;
    } else {
        pub type PlatformParking = CondvarParking;
    }
}

/// Parking instance suited to the current platform
pub fn new_parking() -> Box<dyn IdleParking> {
    Box::new(PlatformParking::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn check_timeout(parking: &dyn IdleParking) {
        let start = Instant::now();
        let woken = parking.park(Some(Duration::from_millis(50)), &|| false);
        assert!(!woken);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    fn check_has_work_skips_sleep(parking: &dyn IdleParking) {
        let start = Instant::now();
        assert!(!parking.park(Some(Duration::from_secs(5)), &|| true));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(parking.parked_count(), 0);
    }

    fn check_wake_one(parking: Arc<dyn IdleParking>) {
        let p2 = Arc::clone(&parking);
        let flag = Arc::new(AtomicBool::new(false));
        let f2 = Arc::clone(&flag);
        let handle = thread::spawn(move || {
            p2.park(Some(Duration::from_secs(10)), &|| f2.load(Ordering::SeqCst));
            f2.load(Ordering::SeqCst)
        });

        thread::sleep(Duration::from_millis(50));
        flag.store(true, Ordering::SeqCst);
        parking.wake_one();

        let start = Instant::now();
        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_platform_parking() {
        let parking = new_parking();
        check_timeout(parking.as_ref());
        check_has_work_skips_sleep(parking.as_ref());
        check_wake_one(Arc::new(PlatformParking::new()));
    }

    #[test]
    fn test_condvar_parking() {
        let parking = CondvarParking::new();
        check_timeout(&parking);
        check_has_work_skips_sleep(&parking);
        check_wake_one(Arc::new(CondvarParking::new()));
    }
}
