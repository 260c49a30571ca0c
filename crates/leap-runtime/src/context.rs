//! Simulation context
//!
//! One `Context` per run owns everything that used to be process-global:
//! the channel matcher, the registered routers, the module schedulers and
//! the shared lifecycle flags. Modules and other threads see the flags
//! through cheap `ContextHandle` clones.
//!
//! Lifecycle, each phase exactly once and in order:
//!
//! ```text
//! Created --elaborate--> Elaborated --route--> Routed --execute--> Executing -> Done
//! ```
//!
//! `quiesce()` and `finish()` may be called at any time from any thread.

use crate::config::RuntimeConfig;
use crate::parking;
use crate::ready_queue::{FifoQueue, ReadyQueue};
use crate::scheduler::{ExecCtl, ModuleStats, Schedulable, Slice};
use crate::signal::{self, FinishSubscription};
use crate::task::TaskTable;
use crate::worker::WorkerPool;

use leap_core::constants::MAX_MODULES;
use leap_core::{
    channel, kdebug, kerror, kinfo, ChannelMatcher, ChannelRouter, ConnectKind, LeapError,
    LeapResult, LiRecv, LiSend, LogStats, Phase, RouteReport, StatsSink, TaskId,
};

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct Shared {
    phase: AtomicU8,
    quiescing: AtomicBool,
    finished: AtomicBool,
    active: AtomicUsize,
}

/// Shared view of a context's lifecycle flags
#[derive(Clone)]
pub struct ContextHandle {
    shared: Arc<Shared>,
}

impl ContextHandle {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                phase: AtomicU8::new(Phase::Created as u8),
                quiescing: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Ask modules to wind down: each exits the next time it stalls
    pub fn quiesce(&self) {
        if !self.shared.quiescing.swap(true, Ordering::AcqRel) {
            kdebug!("context quiescing");
        }
    }

    /// Stop every module after its current step
    pub fn finish(&self) {
        if !self.shared.finished.swap(true, Ordering::AcqRel) {
            kdebug!("context finishing");
        }
    }

    #[inline]
    pub fn is_quiescing(&self) -> bool {
        self.shared.quiescing.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// Modules spawned by `execute()` that have not exited yet
    #[inline]
    pub fn active_modules(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> Phase {
        Phase::from(self.shared.phase.load(Ordering::Acquire))
    }

    fn advance(&self, from: Phase, to: Phase) -> LeapResult<()> {
        self.shared
            .phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| LeapError::InvalidPhase {
                expected: from.name(),
                actual: Phase::from(actual).name(),
            })
    }

    /// Record one module exit. Saturates at zero.
    fn module_done(&self) {
        let prev = self
            .shared
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if prev.is_err() {
            kerror!("active module count underflow");
        }
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("phase", &self.phase())
            .field("quiescing", &self.is_quiescing())
            .field("finished", &self.is_finished())
            .field("active", &self.active_modules())
            .finish()
    }
}

/// What `execute()` did
#[derive(Debug, Clone, Default)]
pub struct ExecuteSummary {
    pub modules: Vec<ModuleStats>,
    pub fired: u64,
    pub stalls: u64,
    pub elapsed: Duration,
}

pub struct Context {
    handle: ContextHandle,
    config: RuntimeConfig,
    matcher: Arc<ChannelMatcher>,
    routers: Vec<Arc<dyn ChannelRouter>>,
    modules: Vec<Box<dyn Schedulable>>,
    stats: Arc<dyn StatsSink>,
    finish_signal: Option<FinishSubscription>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Context configured from the environment
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::from_env())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let matcher = Arc::new(ChannelMatcher::new(config.queue_depth));
        Self {
            handle: ContextHandle::new(),
            routers: vec![matcher.clone() as Arc<dyn ChannelRouter>],
            matcher,
            config,
            modules: Vec::new(),
            stats: Arc::new(LogStats),
            finish_signal: None,
        }
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn matcher(&self) -> &Arc<ChannelMatcher> {
        &self.matcher
    }

    pub fn phase(&self) -> Phase {
        self.handle.phase()
    }

    /// Where `execute()` reports per-module counters (default: the log)
    pub fn set_stats_sink(&mut self, sink: Arc<dyn StatsSink>) {
        self.stats = sink;
    }

    /// Extra router consulted by `route()` after the channel matcher
    pub fn add_router(&mut self, router: Arc<dyn ChannelRouter>) {
        self.routers.push(router);
    }

    /// Named SEND, bound to the RECV of the same name when it appears
    pub fn send<T: Send + 'static>(&self, name: &str) -> LeapResult<LiSend<T>> {
        self.matcher.send(name)
    }

    /// Named RECV, bound to the SEND of the same name when it appears
    pub fn recv<T: Send + 'static>(&self, name: &str) -> LeapResult<LiRecv<T>> {
        self.matcher.recv(name)
    }

    /// Wire two unnamed endpoints directly
    pub fn connect<T>(&self, send: &LiSend<T>, recv: &LiRecv<T>) -> ConnectKind {
        channel::connect(send, recv, self.config.queue_depth)
    }

    /// Hand a module scheduler to the context. Allowed until `execute()`.
    pub fn register_module<S: Schedulable + 'static>(&mut self, mut module: S) -> LeapResult<TaskId> {
        let phase = self.phase();
        if phase >= Phase::Executing {
            return Err(LeapError::InvalidPhase { expected: "Routed", actual: phase.name() });
        }
        if self.modules.len() >= MAX_MODULES {
            return Err(LeapError::InvalidConfig("too many modules"));
        }
        module.spawn(self.handle());
        self.modules.push(Box::new(module));
        Ok(TaskId::new((self.modules.len() - 1) as u32))
    }

    pub fn num_modules(&self) -> usize {
        self.modules.len()
    }

    /// Build the system. `f` creates modules and channels; an error aborts
    /// elaboration and leaves the context in `Created`.
    pub fn elaborate<F>(&mut self, f: F) -> LeapResult<()>
    where
        F: FnOnce(&mut Context) -> LeapResult<()>,
    {
        let phase = self.phase();
        if phase != Phase::Created {
            return Err(LeapError::InvalidPhase { expected: "Created", actual: phase.name() });
        }
        f(self)?;
        self.handle.advance(Phase::Created, Phase::Elaborated)?;
        kdebug!("elaborated {} modules", self.modules.len());
        Ok(())
    }

    /// Resolve named channels through every router. Dangling channels are
    /// reported and tolerated.
    pub fn route(&mut self) -> LeapResult<RouteReport> {
        self.handle.advance(Phase::Elaborated, Phase::Routed)?;
        let mut report = RouteReport::default();
        for router in &self.routers {
            let r = router.route();
            kdebug!(
                "router '{}': {} bound, {} dangling",
                router.name(),
                r.bound,
                r.dangling.len()
            );
            report.bound += r.bound;
            report.dangling.extend(r.dangling);
        }
        Ok(report)
    }

    /// Run every registered module to completion.
    ///
    /// Blocks until the active-module count reaches zero, then stops the
    /// workers and reports per-module counters to the stats sink.
    pub fn execute(&mut self) -> LeapResult<ExecuteSummary> {
        self.config.validate()?;
        self.handle.advance(Phase::Routed, Phase::Executing)?;
        if self.config.debug {
            self.config.print();
        }

        let start = Instant::now();
        let tasks = std::mem::take(&mut self.modules);
        let result = if tasks.is_empty() {
            Ok(Vec::new())
        } else {
            self.run(tasks)
        };
        self.handle.shared.phase.store(Phase::Done as u8, Ordering::Release);
        let modules = result?;

        let mut summary = ExecuteSummary { elapsed: start.elapsed(), ..Default::default() };
        for m in &modules {
            summary.fired += m.fired;
            summary.stalls += m.stalls;
            self.stats.report(&format!("{}.fired", m.name), m.fired);
            self.stats.report(&format!("{}.stalls", m.name), m.stalls);
            for (rule, fired) in &m.rules {
                self.stats.report(&format!("{}.{}.fired", m.name, rule), *fired);
            }
        }
        summary.modules = modules;
        kinfo!(
            "execute done: {} modules, {} rules fired, {} stalls in {:?}",
            summary.modules.len(),
            summary.fired,
            summary.stalls,
            summary.elapsed
        );
        Ok(summary)
    }

    fn run(&self, tasks: Vec<Box<dyn Schedulable>>) -> LeapResult<Vec<ModuleStats>> {
        let count = tasks.len();
        let run = Arc::new(RunState {
            tasks: TaskTable::new(tasks),
            ready: FifoQueue::with_parking(count, parking::new_parking()),
            ctl: ExecCtl {
                fairness_quantum: self.config.fairness_quantum,
                stall_warn_threshold: self.config.stall_warn_threshold,
                stall_fatal_threshold: self.config.stall_fatal_threshold,
                context: self.handle(),
            },
            idle_spins: self.config.idle_spins,
            park_timeout: self.config.park_timeout,
        });

        self.handle.shared.active.store(count, Ordering::Release);
        for id in run.tasks.ids() {
            run.ready.push(id);
        }

        let mut pool = WorkerPool::new(self.config.num_workers);
        let worker_run = Arc::clone(&run);
        let started = pool.start(move |id, shutdown| worker_loop(&worker_run, id, shutdown));
        if let Err(e) = started {
            pool.shutdown();
            run.ready.wake_all();
            pool.join();
            return Err(e);
        }
        kdebug!("{} modules on {} workers", count, pool.num_workers());

        while self.handle.active_modules() > 0 {
            if self.finish_signal.is_some_and(|s| s.pending()) && !self.handle.is_finished() {
                kinfo!("finish signal received");
                self.handle.finish();
            }
            thread::sleep(self.config.poll_interval);
        }

        pool.shutdown();
        run.ready.wake_all();
        pool.join();
        Ok(run.tasks.stats())
    }

    pub fn quiesce(&self) {
        self.handle.quiesce();
    }

    pub fn finish(&self) {
        self.handle.finish();
    }

    pub fn is_quiescing(&self) -> bool {
        self.handle.is_quiescing()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn active_modules(&self) -> usize {
        self.handle.active_modules()
    }

    /// SIGINT/SIGTERM received from now on finish this context's
    /// `execute()`
    pub fn install_signal_finish(&mut self) -> LeapResult<()> {
        signal::install_finish_handler()?;
        self.finish_signal.get_or_insert_with(FinishSubscription::new);
        Ok(())
    }
}

struct RunState {
    tasks: TaskTable,
    ready: FifoQueue,
    ctl: ExecCtl,
    idle_spins: u32,
    park_timeout: Duration,
}

fn worker_loop(run: &RunState, worker_id: usize, shutdown: &AtomicBool) {
    kdebug!("worker {} started", worker_id);
    let mut idle_spins = 0u32;

    while !shutdown.load(Ordering::Acquire) {
        match run.ready.pop() {
            Some(id) => {
                idle_spins = 0;
                run_slice(run, id);
            }
            None if idle_spins < run.idle_spins => {
                idle_spins += 1;
                std::hint::spin_loop();
                thread::yield_now();
            }
            None => {
                run.ready.park(run.park_timeout);
                idle_spins = 0;
            }
        }
    }
    kdebug!("worker {} exiting", worker_id);
}

fn run_slice(run: &RunState, id: TaskId) {
    let Some(mut task) = run.tasks.take(id) else {
        kerror!("task {} scheduled while not in its slot", id);
        return;
    };
    let slice = task.execute(&run.ctl);
    run.tasks.put(id, task);
    match slice {
        Slice::Yield => run.ready.push(id),
        Slice::Done => run.ctl.context.module_done(),
    }
}
