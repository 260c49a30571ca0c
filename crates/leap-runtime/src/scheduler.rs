//! Per-module rule scheduler
//!
//! A module is a piece of state `M` plus an ordered list of guarded rules.
//! Each step scans the rules from index 0 and fires the first one whose
//! guard holds; exactly one action runs per step and the next step starts
//! again from index 0, so the highest-priority ready rule always wins.
//!
//! A step that fires nothing is a stall. Stalls end the current slice and
//! hand the worker back to the ready queue instead of spinning.

use crate::context::ContextHandle;
use leap_core::{kdebug, kerror, kwarn, LeapError, LeapResult, SchedulerState};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

type Guard<M> = Box<dyn Fn(&M) -> bool + Send>;
type Action<M> = Box<dyn FnMut(&mut M, &mut RuleCtx<'_>) + Send>;

/// One guarded action
pub struct Rule<M> {
    name: String,
    guard: Guard<M>,
    action: Action<M>,
    fired: u64,
}

impl<M> Rule<M> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }
}

/// What a rule action can ask of its surroundings
pub struct RuleCtx<'a> {
    finish: bool,
    context: Option<&'a ContextHandle>,
}

impl<'a> RuleCtx<'a> {
    fn new(context: Option<&'a ContextHandle>) -> Self {
        Self { finish: false, context }
    }

    /// Finish this module once the current action returns
    pub fn finish(&mut self) {
        self.finish = true;
    }

    /// True when the owning context is draining
    pub fn quiescing(&self) -> bool {
        self.context.map_or(false, |c| c.is_quiescing())
    }

    /// The owning context, `None` when the scheduler runs standalone
    pub fn context(&self) -> Option<&'a ContextHandle> {
        self.context
    }
}

/// Result of one scheduler step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Rule at this index fired
    Fired(usize),
    Stalled,
    Finished,
}

/// What a slice asks of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slice {
    /// Re-enqueue at the back of the ready queue
    Yield,
    /// Module is done; never run again
    Done,
}

/// Parameters shared by every slice of one `execute()`
#[derive(Clone)]
pub struct ExecCtl {
    pub fairness_quantum: u32,
    pub stall_warn_threshold: u64,
    pub stall_fatal_threshold: u64,
    pub context: ContextHandle,
}

/// Counters of one module after (or during) execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleStats {
    pub name: String,
    pub state: SchedulerState,
    pub fired: u64,
    pub stalls: u64,
    /// `(rule name, times fired)` in priority order
    pub rules: Vec<(String, u64)>,
}

/// A unit of work the worker pool can run
pub trait Schedulable: Send {
    fn name(&self) -> &str;

    fn state(&self) -> SchedulerState;

    /// Attach to a context. Called once by `Context::register_module`.
    fn spawn(&mut self, context: ContextHandle);

    /// Run until a stall, the fairness quantum, or a terminal state
    fn execute(&mut self, ctl: &ExecCtl) -> Slice;

    fn stats(&self) -> ModuleStats;
}

pub struct RuleScheduler<M> {
    name: String,
    module: M,
    rules: Vec<Rule<M>>,
    state: SchedulerState,
    spawned: bool,
    context: Option<ContextHandle>,
    fired: u64,
    stalls: u64,
    consecutive_stalls: u64,
    stall_warnings: u64,
}

impl<M> RuleScheduler<M> {
    pub fn new(name: impl Into<String>, module: M) -> Self {
        Self {
            name: name.into(),
            module,
            rules: Vec::new(),
            state: SchedulerState::Spawned,
            spawned: false,
            context: None,
            fired: 0,
            stalls: 0,
            consecutive_stalls: 0,
            stall_warnings: 0,
        }
    }

    /// Append a rule at the lowest priority so far.
    /// Fails once the scheduler has been handed to a context.
    pub fn register_rule<G, A>(&mut self, name: &str, guard: G, action: A) -> LeapResult<usize>
    where
        G: Fn(&M) -> bool + Send + 'static,
        A: FnMut(&mut M, &mut RuleCtx<'_>) + Send + 'static,
    {
        if self.spawned {
            return Err(LeapError::AlreadySpawned(self.name.clone()));
        }
        self.rules.push(Rule {
            name: name.to_string(),
            guard: Box::new(guard),
            action: Box::new(action),
            fired: 0,
        });
        Ok(self.rules.len() - 1)
    }

    /// Builder form of `register_rule` for schedulers under construction
    pub fn rule<G, A>(mut self, name: &str, guard: G, action: A) -> Self
    where
        G: Fn(&M) -> bool + Send + 'static,
        A: FnMut(&mut M, &mut RuleCtx<'_>) + Send + 'static,
    {
        if let Err(e) = self.register_rule(name, guard, action) {
            kerror!("{}", e);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut M {
        &mut self.module
    }

    pub fn into_module(self) -> M {
        self.module
    }

    pub fn rules(&self) -> &[Rule<M>] {
        &self.rules
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn finish(&mut self) {
        self.state = SchedulerState::Finished;
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }

    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    pub fn consecutive_stalls(&self) -> u64 {
        self.consecutive_stalls
    }

    /// Possible-deadlock warnings logged so far
    pub fn stall_warnings(&self) -> u64 {
        self.stall_warnings
    }

    /// Fire at most one rule: the first whose guard is true.
    pub fn execute_step(&mut self) -> Step {
        if self.state.is_terminal() {
            return Step::Finished;
        }
        if self.context.as_ref().map_or(false, |c| c.is_finished()) {
            self.state = SchedulerState::Finished;
            return Step::Finished;
        }

        let module = &mut self.module;
        let context = self.context.as_ref();
        for (index, rule) in self.rules.iter_mut().enumerate() {
            if !(rule.guard)(module) {
                continue;
            }
            let mut ctx = RuleCtx::new(context);
            (rule.action)(module, &mut ctx);
            rule.fired += 1;
            self.fired += 1;
            self.consecutive_stalls = 0;
            self.state = if ctx.finish {
                SchedulerState::Finished
            } else {
                SchedulerState::Running
            };
            return Step::Fired(index);
        }

        self.stalls += 1;
        self.consecutive_stalls += 1;
        self.state = SchedulerState::Stalled;
        Step::Stalled
    }

    /// Stall diagnostics. Returns true if the module was terminated.
    fn check_stalls(&mut self, warn: u64, fatal: u64) -> bool {
        let n = self.consecutive_stalls;
        if fatal > 0 && n >= fatal {
            kerror!(
                "module '{}' stalled {} consecutive steps; terminating (likely deadlock)",
                self.name, n
            );
            self.state = SchedulerState::Finished;
            return true;
        }
        if warn > 0 && n > 0 && n % warn == 0 {
            self.stall_warnings += 1;
            kwarn!(
                "module '{}' has stalled {} consecutive steps; possible deadlock",
                self.name, n
            );
        }
        false
    }
}

impl<M: Send + 'static> Schedulable for RuleScheduler<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> SchedulerState {
        self.state
    }

    fn spawn(&mut self, context: ContextHandle) {
        self.spawned = true;
        self.context = Some(context);
    }

    fn execute(&mut self, ctl: &ExecCtl) -> Slice {
        for _ in 0..ctl.fairness_quantum.max(1) {
            let step = match catch_unwind(AssertUnwindSafe(|| self.execute_step())) {
                Ok(step) => step,
                Err(payload) => {
                    kerror!("module '{}' panicked: {}", self.name, panic_message(&*payload));
                    self.state = SchedulerState::Finished;
                    return Slice::Done;
                }
            };

            match step {
                Step::Fired(_) if self.state.is_terminal() => return Slice::Done,
                Step::Fired(_) => {}
                Step::Finished => return Slice::Done,
                Step::Stalled => {
                    if self.check_stalls(ctl.stall_warn_threshold, ctl.stall_fatal_threshold) {
                        return Slice::Done;
                    }
                    if ctl.context.is_quiescing() {
                        kdebug!("module '{}' drained", self.name);
                        self.state = SchedulerState::Finished;
                        return Slice::Done;
                    }
                    return Slice::Yield;
                }
            }
        }
        Slice::Yield
    }

    fn stats(&self) -> ModuleStats {
        ModuleStats {
            name: self.name.clone(),
            state: self.state,
            fired: self.fired,
            stalls: self.stalls,
            rules: self.rules.iter().map(|r| (r.name.clone(), r.fired)).collect(),
        }
    }
}

impl<M> std::fmt::Debug for RuleScheduler<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleScheduler")
            .field("name", &self.name)
            .field("rules", &self.rules.len())
            .field("state", &self.state)
            .field("fired", &self.fired)
            .field("stalls", &self.stalls)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[derive(Default)]
    struct Counter {
        n: u32,
        log: Vec<&'static str>,
    }

    fn ctl(ctx: &Context) -> ExecCtl {
        ExecCtl {
            fairness_quantum: 1000,
            stall_warn_threshold: 0,
            stall_fatal_threshold: 0,
            context: ctx.handle(),
        }
    }

    #[test]
    fn test_priority_order_restarts_from_zero() {
        // Rule 0 fires while n is odd, rule 1 bumps n when even.
        let mut s = RuleScheduler::new("prio", Counter::default())
            .rule("odd", |m: &Counter| m.n % 2 == 1, |m, _| {
                m.log.push("odd");
                m.n += 1;
            })
            .rule("even", |m: &Counter| m.n < 4, |m, _| {
                m.log.push("even");
                m.n += 1;
            });

        while let Step::Fired(_) = s.execute_step() {}
        assert_eq!(s.module().log, vec!["even", "odd", "even", "odd"]);
        assert_eq!(s.fired(), 4);
        assert_eq!(s.state(), SchedulerState::Stalled);
    }

    #[test]
    fn test_higher_priority_preempts_lower() {
        // r0 becomes ready only after r2 has fired once; it must fire
        // before r2 gets a second turn.
        let mut s = RuleScheduler::new("p1", Counter::default())
            .rule("r0", |m: &Counter| m.log.last() == Some(&"r2"), |m, _| m.log.push("r0"))
            .rule("r1", |_| false, |m, _| m.log.push("r1"))
            .rule("r2", |m: &Counter| m.log.len() < 4, |m, _| m.log.push("r2"));

        while let Step::Fired(_) = s.execute_step() {}
        assert_eq!(s.module().log, vec!["r2", "r0", "r2", "r0"]);
    }

    #[test]
    fn test_at_most_one_action_per_step() {
        let mut s = RuleScheduler::new("one", Counter::default());
        for name in ["a", "b", "c"] {
            s.register_rule(name, |m: &Counter| m.n < 30, move |m, _| {
                m.log.push(name);
                m.n += 1;
            })
            .unwrap();
        }
        let mut steps = 0;
        loop {
            let before = s.module().log.len();
            match s.execute_step() {
                Step::Fired(i) => {
                    assert_eq!(i, 0, "highest-priority ready rule must win");
                    assert_eq!(s.module().log.len(), before + 1);
                }
                _ => break,
            }
            steps += 1;
        }
        assert_eq!(steps, 30);
        assert_eq!(s.stats().rules, vec![("a".to_string(), 30), ("b".to_string(), 0), ("c".to_string(), 0)]);
    }

    #[test]
    fn test_stall_counters() {
        let mut s = RuleScheduler::new("idle", Counter::default())
            .rule("never", |_| false, |_, _| {});
        for _ in 0..3 {
            assert_eq!(s.execute_step(), Step::Stalled);
        }
        assert_eq!(s.stalls(), 3);
        assert_eq!(s.consecutive_stalls(), 3);
    }

    #[test]
    fn test_finish_from_action() {
        let mut s = RuleScheduler::new("fin", Counter::default())
            .rule("go", |_| true, |m, ctx| {
                m.n += 1;
                if m.n == 3 {
                    ctx.finish();
                }
            });
        while let Step::Fired(_) = s.execute_step() {}
        assert!(s.is_finished());
        assert_eq!(s.module().n, 3);
        assert_eq!(s.execute_step(), Step::Finished);
    }

    #[test]
    fn test_register_after_spawn_fails() {
        let ctx = Context::new();
        let mut s = RuleScheduler::new("late", Counter::default());
        s.spawn(ctx.handle());
        let err = s.register_rule("x", |_| true, |_, _| {}).unwrap_err();
        assert_eq!(err, LeapError::AlreadySpawned("late".into()));
    }

    #[test]
    fn test_slice_yields_on_stall_and_respects_quantum() {
        let ctx = Context::new();
        let mut s = RuleScheduler::new("slice", Counter::default())
            .rule("to-10", |m: &Counter| m.n < 10, |m, _| m.n += 1);
        s.spawn(ctx.handle());

        let mut c = ctl(&ctx);
        c.fairness_quantum = 4;
        assert_eq!(s.execute(&c), Slice::Yield);
        assert_eq!(s.module().n, 4);

        c.fairness_quantum = 100;
        assert_eq!(s.execute(&c), Slice::Yield);
        assert_eq!(s.module().n, 10);
        assert_eq!(s.state(), SchedulerState::Stalled);
    }

    #[test]
    fn test_stall_warning_every_threshold_multiple() {
        let ctx = Context::new();
        let mut s = RuleScheduler::new("slow", Counter::default())
            .rule("never", |_| false, |_, _| {});
        s.spawn(ctx.handle());
        let mut c = ctl(&ctx);
        c.stall_warn_threshold = 2;
        for _ in 0..5 {
            assert_eq!(s.execute(&c), Slice::Yield);
        }
        assert_eq!(s.consecutive_stalls(), 5);
        assert_eq!(s.stall_warnings(), 2);
        assert!(!s.is_finished());
    }

    #[test]
    fn test_stall_fatal_terminates() {
        let ctx = Context::new();
        let mut s = RuleScheduler::new("stuck", Counter::default())
            .rule("never", |_| false, |_, _| {});
        s.spawn(ctx.handle());
        let mut c = ctl(&ctx);
        c.stall_fatal_threshold = 3;
        assert_eq!(s.execute(&c), Slice::Yield);
        assert_eq!(s.execute(&c), Slice::Yield);
        assert_eq!(s.execute(&c), Slice::Done);
        assert!(s.is_finished());
    }

    #[test]
    fn test_quiescing_drains_stalled_module() {
        let ctx = Context::new();
        let mut s = RuleScheduler::new("q", Counter::default())
            .rule("to-2", |m: &Counter| m.n < 2, |m, _| m.n += 1);
        s.spawn(ctx.handle());
        ctx.quiesce();
        assert_eq!(s.execute(&ctl(&ctx)), Slice::Done);
        // Pending work still ran before the module drained
        assert_eq!(s.module().n, 2);
        assert!(s.is_finished());
    }

    #[test]
    fn test_context_finish_stops_after_current_step() {
        let ctx = Context::new();
        let mut s = RuleScheduler::new("forever", Counter::default())
            .rule("spin", |_| true, |m, ctx| {
                m.n += 1;
                if m.n == 5 {
                    if let Some(c) = ctx.context() {
                        c.finish();
                    }
                }
            });
        s.spawn(ctx.handle());
        assert_eq!(s.execute(&ctl(&ctx)), Slice::Done);
        assert_eq!(s.module().n, 5);
    }

    #[test]
    fn test_panicking_action_finishes_module() {
        let ctx = Context::new();
        let mut s = RuleScheduler::new("boom", Counter::default())
            .rule("explode", |_| true, |_, _| panic!("bad rule"));
        s.spawn(ctx.handle());
        assert_eq!(s.execute(&ctl(&ctx)), Slice::Done);
        assert_eq!(s.state(), SchedulerState::Finished);
    }
}
