//! # leap - software runtime for FPGA/software hybrid simulation
//!
//! Modules are latency-insensitive rule schedulers connected by named
//! channels. Software talks to the other side of a physical link through
//! RRR request/response services and credit flow-controlled channels.
//!
//! ## Quick Start
//!
//! ```ignore
//! use leap::{Context, RuleScheduler};
//!
//! let mut ctx = Context::new();
//! ctx.elaborate(|c| {
//!     let tx = c.send::<u32>("count")?;
//!     let rx = c.recv::<u32>("count")?;
//!     c.register_module(RuleScheduler::new("producer", (tx, 0u32)).rule(
//!         "emit",
//!         |(tx, _)| tx.not_full(),
//!         |(tx, n), r| {
//!             tx.enq(*n);
//!             *n += 1;
//!             if *n == 10 { r.finish(); }
//!         },
//!     ))?;
//!     c.register_module(RuleScheduler::new("consumer", rx).rule(
//!         "take",
//!         |rx| rx.not_empty(),
//!         |rx, r| if rx.deq() == Some(9) { r.finish() },
//!     ))?;
//!     Ok(())
//! })?;
//! ctx.route()?;
//! ctx.execute()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │   Context: elaborate → route → execute, quiesce/finish     │
//! └───────────────────────────────────────────────────────────┘
//!        │ modules                         │ routers
//!        ▼                                 ▼
//! ┌──────────────────┐          ┌────────────────────────────┐
//! │ Worker pool      │          │ Channel matcher (LI names) │
//! │ RuleScheduler    │          │ ChannelIo (link channels)  │
//! └──────────────────┘          └────────────────────────────┘
//!                                          │
//!                                          ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │ Monitor: reads the physical link, dispatches services,      │
//! │ feeds channel I/O, answers system-thread requests           │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub use leap_core::{
    connect, li_channel, ChannelMatcher, ChannelRouter, ConnectKind, DanglingChannel,
    DebugScanSink, ExitHook, LeapError, LeapResult, LiRecv, LiSend, LogStats, Matched,
    MemoryStats, NullStats, Phase, RouteReport, ScanCollector, SchedulerState, StatsSink,
    StringTable, TaskId, TryPushError,
};
pub use leap_core::{log_exit_hook, process_exit_hook};

// Logging
pub use leap_core::{kdebug, kerror, kinfo, kprint, kprintln, ktrace, kwarn};
pub use leap_core::kprint::{
    errors_logged, init as init_logging, set_flush_enabled, set_log_level, set_target_tag_enabled,
    set_thread_tag_enabled, LogLevel,
};

pub use leap_core::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

pub use leap_runtime::{
    Context, ContextHandle, ExecuteSummary, ModuleStats, RuleCtx, RuleScheduler, RuntimeConfig,
    Schedulable, Slice, Step,
};

pub use leap_rrr::{
    AssertionsService, ChunkDevice, ChunkedChannel, InboundSink, LoopbackDevice, Message,
    Monitor, MonitorConfig, MonitorHandle, PhysicalChannel, RrrClient, RrrError, RrrResult,
    RrrService, ServiceHandle, ServiceStub, Severity, SystemHandle,
};

pub use leap_chanio::{
    ChanioConfig, ChanioError, ChannelIo, CreditCounter, InboundChannel, MulticastGroup,
    OutboundChannel, RouteThrough,
};

mod platform;
pub use platform::Platform;
