//! Platform: a context plus, optionally, one physical link to the other side
//!
//! Wires up the pieces every linked simulation needs: the monitor reading
//! the link, the assertion service, channel I/O registered both as a
//! monitor sink and as a context router, and the system-thread RRR handle.

use leap_chanio::{ChanioConfig, ChannelIo};
use leap_core::{
    kdebug, kinfo, log_exit_hook, ExitHook, LeapError, LeapResult, LogStats, StatsSink,
    StringTable,
};
use leap_runtime::{Context, ExecuteSummary, RuntimeConfig};
use leap_rrr::{
    AssertionsService, Monitor, MonitorConfig, MonitorHandle, PhysicalChannel, SystemHandle,
};

use std::sync::Arc;

enum MonitorState {
    Idle(Monitor),
    Running(MonitorHandle),
    Stopped,
}

struct Link {
    system: SystemHandle,
    chanio: ChannelIo,
    monitor: MonitorState,
}

pub struct Platform {
    context: Context,
    link: Option<Link>,
    strings: Arc<StringTable>,
    stats: Arc<dyn StatsSink>,
}

impl Platform {
    /// Software-only platform
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            context: Context::with_config(config),
            link: None,
            strings: Arc::new(StringTable::new()),
            stats: Arc::new(LogStats),
        }
    }

    /// Platform attached to `physical`. Fatal assertions from the other
    /// side run `exit`.
    pub fn with_link(
        config: RuntimeConfig,
        physical: Arc<dyn PhysicalChannel>,
        chanio: ChanioConfig,
        exit: ExitHook,
    ) -> LeapResult<Self> {
        let mut platform = Self::new(config);
        let (system, mut monitor) = Monitor::over(Arc::clone(&physical));
        let chanio = ChannelIo::new("link", physical, chanio)?;
        chanio.attach(&mut monitor)?;
        monitor.register_service(Box::new(AssertionsService::new(
            Arc::clone(&platform.strings),
            exit,
        )))?;
        platform.context.add_router(Arc::new(chanio.clone()));
        platform.link = Some(Link { system, chanio, monitor: MonitorState::Idle(monitor) });
        Ok(platform)
    }

    /// `with_link` with an exit hook that only logs
    pub fn with_link_default(physical: Arc<dyn PhysicalChannel>) -> LeapResult<Self> {
        Self::with_link(
            RuntimeConfig::from_env(),
            physical,
            ChanioConfig::from_env(),
            log_exit_hook(),
        )
    }

    pub fn context(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn strings(&self) -> &Arc<StringTable> {
        &self.strings
    }

    pub fn set_stats_sink(&mut self, sink: Arc<dyn StatsSink>) {
        self.context.set_stats_sink(Arc::clone(&sink));
        self.stats = sink;
    }

    pub fn chanio(&self) -> Option<&ChannelIo> {
        self.link.as_ref().map(|l| &l.chanio)
    }

    /// Handle for blocking requests to the other side
    pub fn system(&mut self) -> Option<&mut SystemHandle> {
        self.link.as_mut().map(|l| &mut l.system)
    }

    /// The monitor, while it is not running; used to register services
    pub fn monitor_mut(&mut self) -> Option<&mut Monitor> {
        match self.link.as_mut().map(|l| &mut l.monitor) {
            Some(MonitorState::Idle(m)) => Some(m),
            _ => None,
        }
    }

    /// Start reading the link on the monitor thread
    pub fn start_monitor(&mut self, config: MonitorConfig) -> LeapResult<()> {
        let Some(link) = self.link.as_mut() else {
            return Err(LeapError::Transport("platform has no link".into()));
        };
        match std::mem::replace(&mut link.monitor, MonitorState::Stopped) {
            MonitorState::Idle(monitor) => {
                link.monitor = MonitorState::Running(monitor.spawn(config)?);
                kdebug!("platform: monitor started");
                Ok(())
            }
            other => {
                link.monitor = other;
                Err(LeapError::Transport("monitor already started".into()))
            }
        }
    }

    /// Elaborate with `f`, route, and execute every module
    pub fn run<F>(&mut self, f: F) -> LeapResult<ExecuteSummary>
    where
        F: FnOnce(&mut Context) -> LeapResult<()>,
    {
        self.context.elaborate(f)?;
        self.context.route()?;
        self.context.execute()
    }

    /// Stop the monitor, close channel I/O, and report link statistics.
    /// The platform is software-only afterwards.
    pub fn shutdown(&mut self) -> LeapResult<()> {
        let Some(link) = self.link.take() else {
            return Ok(());
        };
        link.chanio.close();
        let monitor = match link.monitor {
            MonitorState::Running(handle) => Some(handle.shutdown()?),
            MonitorState::Idle(monitor) => Some(monitor),
            MonitorState::Stopped => None,
        };
        if let Some(monitor) = monitor {
            monitor.report_stats(self.stats.as_ref());
            monitor.close();
        }
        link.chanio.report_stats(self.stats.as_ref());
        kinfo!("platform: link shut down");
        Ok(())
    }
}

impl Drop for Platform {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
