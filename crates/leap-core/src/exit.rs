//! Exit callback
//!
//! Fatal conditions raised by services (an assertion from the other side
//! of the link, for instance) are reported through an `ExitHook` instead of
//! ending the process directly, so embedders and tests decide what exit
//! means.

use crate::kerror;
use std::sync::Arc;

pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// Hook that terminates the process with the given code
pub fn process_exit_hook() -> ExitHook {
    Arc::new(|code| {
        kerror!("exiting with code {}", code);
        std::process::exit(code)
    })
}

/// Hook that only logs; useful when the caller polls for failure itself
pub fn log_exit_hook() -> ExitHook {
    Arc::new(|code| kerror!("exit requested with code {}", code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn test_custom_hook_sees_code() {
        let seen = Arc::new(AtomicI32::new(0));
        let hook: ExitHook = {
            let seen = Arc::clone(&seen);
            Arc::new(move |code| seen.store(code, Ordering::SeqCst))
        };
        hook(3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        log_exit_hook()(1);
    }
}
