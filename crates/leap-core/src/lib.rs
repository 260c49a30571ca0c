//! # leap-core
//!
//! Core types for the LEAP software runtime.
//!
//! This crate has no threads of its own and no OS-specific code beyond the
//! log thread tag. Scheduling lives in `leap-runtime`, transports in
//! `leap-rrr` and `leap-chanio`.
//!
//! ## Modules
//!
//! - `channel` - LI half-channels (`LiSend`/`LiRecv`) and explicit `connect`
//! - `matcher` - Name-based SEND/RECV matching during elaboration
//! - `queue` - Bounded queue backing a connected channel
//! - `state` - Scheduler state and context phase enums
//! - `id` - Module task identifier
//! - `error` - Error types
//! - `spinlock` - Internal spinlock primitive
//! - `stats` - Statistics sink contract
//! - `scan` - Debug-scan byte sink contract
//! - `strings` - Global string table
//! - `exit` - Exit callback type
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod queue;
pub mod channel;
pub mod matcher;
pub mod error;
pub mod spinlock;
pub mod stats;
pub mod scan;
pub mod strings;
pub mod exit;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::TaskId;
pub use state::{Phase, SchedulerState};
pub use queue::{BoundedQueue, Reserved};
pub use channel::{connect, li_channel, ConnectKind, LiRecv, LiSend};
pub use matcher::{ChannelMatcher, ChannelRouter, DanglingChannel, Matched, RouteReport};
pub use error::{ChannelSide, LeapError, LeapResult, TryPushError};
pub use spinlock::SpinLock;
pub use stats::{LogStats, MemoryStats, NullStats, StatsSink};
pub use scan::{DebugScanSink, ScanCollector};
pub use strings::StringTable;
pub use exit::{log_exit_hook, process_exit_hook, ExitHook};
pub use env::{env_get, env_get_bool, env_get_ms, env_get_opt, env_get_str, env_get_us, env_is_set};

/// Runtime-wide constants
pub mod constants {
    pub use crate::channel::LINC_QUEUE_DEPTH;

    /// Upper bound on worker threads
    pub const MAX_WORKERS: usize = 64;

    /// Upper bound on module schedulers in one context
    pub const MAX_MODULES: usize = 1 << 16;
}
