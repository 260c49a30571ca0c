//! SIGINT/SIGTERM handler installation

use leap_core::{kdebug, LeapError, LeapResult};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};

static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_finish_signal(_signo: libc::c_int) {
    // Only async-signal-safe work here: one atomic add
    super::record_finish_signal();
}

/// Route SIGINT and SIGTERM to the finish signal counter. Idempotent.
pub fn install_finish_handler() -> LeapResult<()> {
    if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let action = SigAction::new(
        SigHandler::Handler(on_finish_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only performs an atomic store
        unsafe { sigaction(sig, &action) }.map_err(|e| {
            HANDLER_INSTALLED.store(false, Ordering::SeqCst);
            LeapError::Os(format!("sigaction({}) failed: {}", sig, e))
        })?;
    }
    kdebug!("finish handler installed for SIGINT/SIGTERM");
    Ok(())
}
