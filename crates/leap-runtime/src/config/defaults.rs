//! Library defaults for `RuntimeConfig`
//!
//! Every value here can be overridden by the matching `LEAP_*` environment
//! variable through `RuntimeConfig::from_env()`.

use leap_core::constants::LINC_QUEUE_DEPTH;

/// Worker threads draining the ready queue
pub const NUM_WORKERS: usize = 4;

/// Depth of queues allocated for newly connected channels
pub const QUEUE_DEPTH: usize = LINC_QUEUE_DEPTH;

/// Rule steps a module may take in one slice before yielding
pub const FAIRNESS_QUANTUM: u32 = 64;

/// Consecutive stalls before a possible-deadlock warning
pub const STALL_WARN: u64 = 100_000;

/// Consecutive stalls before a module is terminated (0 = never)
pub const STALL_FATAL: u64 = 0;

/// How often `execute()` checks the active-module count
pub const POLL_INTERVAL_MS: u64 = 1;

/// Spins before an idle worker parks
pub const IDLE_SPINS: u32 = 64;

/// Upper bound on one park
pub const PARK_TIMEOUT_MS: u64 = 10;

pub const DEBUG: bool = false;
