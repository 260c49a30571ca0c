//! # leap-runtime
//!
//! Cooperative execution for LEAP modules.
//!
//! This crate provides:
//! - Rule schedulers (guarded actions, static priority, stall diagnostics)
//! - The `Context` lifecycle (elaborate, route, execute, quiesce, finish)
//! - A FIFO ready queue drained by a fixed pool of worker threads
//! - Idle worker parking (futex on Linux, condvar elsewhere)
//! - SIGINT/SIGTERM finish hook

pub mod config;
pub mod context;
pub mod parking;
pub mod ready_queue;
pub mod scheduler;
pub mod signal;
pub mod task;
pub mod worker;

// Re-exports
pub use config::RuntimeConfig;
pub use context::{Context, ContextHandle, ExecuteSummary};
pub use parking::{new_parking, IdleParking};
pub use ready_queue::{FifoQueue, ReadyQueue};
pub use scheduler::{ExecCtl, ModuleStats, Rule, RuleCtx, RuleScheduler, Schedulable, Slice, Step};
pub use task::TaskTable;
pub use worker::WorkerPool;
