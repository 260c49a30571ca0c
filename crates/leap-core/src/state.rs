//! Scheduler and context state types
//!
//! Both are stored in `AtomicU8`s by their owners, hence the `u8`
//! round-trip conversions.

use core::fmt;

/// State of one module's rule scheduler
///
/// `Spawned -> Running -> (Stalled <-> Running) -> Finished`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    /// Registered with the context, not yet run
    Spawned = 0,

    /// Last step fired a rule
    Running = 1,

    /// Last step found no ready rule; task yielded
    Stalled = 2,

    /// Module called `finish()` or the context terminated it
    Finished = 3,
}

impl SchedulerState {
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SchedulerState::Finished)
    }
}

impl From<u8> for SchedulerState {
    fn from(v: u8) -> Self {
        match v {
            0 => SchedulerState::Spawned,
            1 => SchedulerState::Running,
            2 => SchedulerState::Stalled,
            _ => SchedulerState::Finished,
        }
    }
}

impl From<SchedulerState> for u8 {
    fn from(state: SchedulerState) -> u8 {
        state as u8
    }
}

/// Lifecycle phase of a `Context`
///
/// Phases advance strictly in order; each transition happens once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    Created = 0,
    Elaborated = 1,
    Routed = 2,
    Executing = 3,
    Done = 4,
}

impl Phase {
    pub const fn name(&self) -> &'static str {
        match self {
            Phase::Created => "Created",
            Phase::Elaborated => "Elaborated",
            Phase::Routed => "Routed",
            Phase::Executing => "Executing",
            Phase::Done => "Done",
        }
    }
}

impl From<u8> for Phase {
    fn from(v: u8) -> Self {
        match v {
            0 => Phase::Created,
            1 => Phase::Elaborated,
            2 => Phase::Routed,
            3 => Phase::Executing,
            _ => Phase::Done,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
