//! Process signal hooks
//!
//! SIGINT/SIGTERM only bump a process-wide counter. Each context that
//! installed the hook holds a `FinishSubscription` taken at install time;
//! its `execute()` poll loop turns a newer count into `Context::finish()`.
//! Contexts that never subscribed ignore signals.

use std::sync::atomic::{AtomicU64, Ordering};

static FINISH_SIGNALS: AtomicU64 = AtomicU64::new(0);

/// Finish signals received by the process so far
#[inline]
pub fn finish_signals() -> u64 {
    FINISH_SIGNALS.load(Ordering::Acquire)
}

pub(crate) fn record_finish_signal() {
    FINISH_SIGNALS.fetch_add(1, Ordering::AcqRel);
}

/// One context's view of the finish signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishSubscription {
    seen: u64,
}

impl FinishSubscription {
    /// Only signals received after this call count
    pub fn new() -> Self {
        Self { seen: finish_signals() }
    }

    #[inline]
    pub fn pending(&self) -> bool {
        finish_signals() != self.seen
    }
}

impl Default for FinishSubscription {
    fn default() -> Self {
        Self::new()
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::install_finish_handler;
    } else {
        /// No signal support on this platform; the hook is a no-op
        pub fn install_finish_handler() -> leap_core::LeapResult<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriptions_see_later_signals_only() {
        let early = FinishSubscription::new();
        record_finish_signal();
        let late = FinishSubscription::new();
        assert!(early.pending());
        assert!(!late.pending());

        record_finish_signal();
        assert!(early.pending());
        assert!(late.pending());
    }
}
