//! Monitor: the single reader of a physical channel
//!
//! Owns the `ServiceHandle` and demultiplexes everything that comes in:
//! requests are dispatched to the registered services and answered,
//! responses for the system thread are handed to its slot, and every other
//! channel id goes to the `InboundSink` registered for it.
//!
//! Runs either inline (`poll_once` from the owner's loop) or on its own
//! thread via `spawn`.

use crate::client::{RrrClient, ServiceHandle, SystemHandle};
use crate::error::{RrrError, RrrResult};
use crate::message::{Message, CHANNEL_CLIENT, CHANNEL_SERVER};
use crate::physical::PhysicalChannel;
use crate::service::{RrrService, ServiceTable};
use leap_core::env::env_get_us;
use leap_core::{kdebug, kerror, kinfo, kprintln, kwarn, StatsSink};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Consumer for one inbound channel id
pub trait InboundSink: Send + Sync {
    fn deliver(&self, msg: Message) -> RrrResult<()>;
}

pub mod defaults {
    /// Sleep between empty polls, microseconds
    pub const IDLE_SLEEP_US: u64 = 50;
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sleep after a poll that found nothing
    pub idle_sleep: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl MonitorConfig {
    /// Defaults with `LEAP_MONITOR_IDLE_US` applied
    pub fn from_env() -> Self {
        Self { idle_sleep: env_get_us("LEAP_MONITOR_IDLE_US", defaults::IDLE_SLEEP_US) }
    }

    pub fn new() -> Self {
        Self { idle_sleep: Duration::from_micros(defaults::IDLE_SLEEP_US) }
    }

    pub fn idle_sleep(mut self, d: Duration) -> Self {
        self.idle_sleep = d;
        self
    }

    pub fn print(&self) {
        kprintln!("LEAP monitor configuration:");
        kprintln!("  idle_sleep:  {:?}", self.idle_sleep);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStats {
    pub requests: u64,
    pub responses: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub errors: u64,
}

pub struct Monitor {
    handle: ServiceHandle,
    services: ServiceTable,
    sinks: BTreeMap<u8, Arc<dyn InboundSink>>,
    stats: MonitorStats,
}

impl Monitor {
    pub fn new(handle: ServiceHandle) -> Self {
        Self {
            handle,
            services: ServiceTable::new(),
            sinks: BTreeMap::new(),
            stats: MonitorStats::default(),
        }
    }

    /// Client handles plus a monitor reading `channel`
    pub fn over(channel: Arc<dyn PhysicalChannel>) -> (SystemHandle, Monitor) {
        let (system, service) = RrrClient::new(channel);
        (system, Monitor::new(service))
    }

    pub fn register_service(&mut self, service: Box<dyn RrrService>) -> RrrResult<()> {
        self.services.register(service)
    }

    /// Route messages carrying `channel_id` to `sink`
    pub fn add_sink(&mut self, channel_id: u8, sink: Arc<dyn InboundSink>) -> RrrResult<()> {
        if channel_id == CHANNEL_SERVER || channel_id == CHANNEL_CLIENT {
            return Err(RrrError::Monitor(format!("channel {} is reserved", channel_id)));
        }
        if self.sinks.insert(channel_id, sink).is_some() {
            kwarn!("monitor: sink for channel {} replaced", channel_id);
        }
        Ok(())
    }

    pub fn services(&self) -> &ServiceTable {
        &self.services
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    /// Blocking request from the monitor's own thread
    pub fn make_request(&mut self, req: Message) -> RrrResult<Message> {
        self.handle.make_request(req)
    }

    pub fn write(&self, msg: &Message) -> RrrResult<()> {
        self.handle.write(msg)
    }

    /// One monitor iteration: service ticks, then at most one inbound
    /// message. Returns whether a message was handled.
    ///
    /// Handler failures are logged and counted; only transport errors are
    /// returned.
    pub fn poll_once(&mut self) -> RrrResult<bool> {
        if let Err(e) = self.services.poll_all() {
            kerror!("monitor: service poll failed: {}", e);
            self.stats.errors += 1;
        }
        match self.handle.poll()? {
            Some(msg) => {
                self.route(msg)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn route(&mut self, msg: Message) -> RrrResult<()> {
        if msg.channel_id == CHANNEL_SERVER {
            self.stats.requests += 1;
            match self.services.dispatch(&msg) {
                Ok(Some(resp)) => {
                    self.handle.write(&resp)?;
                    self.stats.responses += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    kerror!("monitor: request svc={} mth={}: {}", msg.service_id, msg.method_id, e);
                    self.stats.errors += 1;
                }
            }
            return Ok(());
        }

        match self.sinks.get(&msg.channel_id) {
            Some(sink) => {
                let channel = msg.channel_id;
                match sink.deliver(msg) {
                    Ok(()) => self.stats.delivered += 1,
                    Err(e) => {
                        kerror!("monitor: sink for channel {}: {}", channel, e);
                        self.stats.errors += 1;
                    }
                }
            }
            None => {
                kwarn!("monitor: no sink for channel {}; message dropped", msg.channel_id);
                self.stats.dropped += 1;
            }
        }
        Ok(())
    }

    /// Run on a thread named `leap-monitor` until the handle is shut down
    /// or the channel disconnects.
    pub fn spawn(self, config: MonitorConfig) -> RrrResult<MonitorHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("leap-monitor".into())
            .spawn(move || self.run(&flag, config.idle_sleep))
            .map_err(|e| RrrError::Monitor(e.to_string()))?;
        Ok(MonitorHandle { stop, handle })
    }

    fn run(mut self, stop: &AtomicBool, idle_sleep: Duration) -> Monitor {
        kdebug!("monitor: started");
        while !stop.load(Ordering::Acquire) {
            match self.poll_once() {
                Ok(true) => {}
                Ok(false) => thread::sleep(idle_sleep),
                Err(RrrError::Disconnected) => {
                    kinfo!("monitor: channel disconnected");
                    break;
                }
                Err(e) => {
                    kerror!("monitor: {}", e);
                    self.stats.errors += 1;
                }
            }
        }
        kdebug!("monitor: stopped ({:?})", self.stats);
        self
    }

    pub fn report_stats(&self, sink: &dyn StatsSink) {
        sink.report("rrr.monitor.requests", self.stats.requests);
        sink.report("rrr.monitor.responses", self.stats.responses);
        sink.report("rrr.monitor.delivered", self.stats.delivered);
        sink.report("rrr.monitor.dropped", self.stats.dropped);
        sink.report("rrr.monitor.errors", self.stats.errors);
        self.services.report_stats(sink);
    }

    /// Close the client side; blocked system requests fail with `Disconnected`
    pub fn close(&self) {
        self.handle.close();
    }
}

/// Running monitor thread
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Monitor>,
}

impl MonitorHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the thread and take the monitor back
    pub fn shutdown(self) -> RrrResult<Monitor> {
        self.stop.store(true, Ordering::Release);
        self.handle
            .join()
            .map_err(|_| RrrError::Monitor("monitor thread panicked".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CHANNEL_LI_DATA;
    use crate::physical::ChunkedChannel;
    use crate::service::ServiceStub;
    use leap_core::MemoryStats;
    use std::sync::Mutex;

    fn complement() -> Box<ServiceStub> {
        Box::new(ServiceStub::new(7, "complement").method(1, "invert", |req| {
            let v = req.reader().u16()?;
            Ok(Some((!v).to_le_bytes().to_vec()))
        }))
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<Message>>);

    impl InboundSink for Collect {
        fn deliver(&self, msg: Message) -> RrrResult<()> {
            self.0.lock().unwrap().push(msg);
            Ok(())
        }
    }

    fn fast() -> MonitorConfig {
        MonitorConfig::new().idle_sleep(Duration::from_micros(10))
    }

    #[test]
    fn test_inline_dispatch_and_sinks() {
        let (local, remote) = ChunkedChannel::loopback_pair();
        let (_system, mut monitor) = Monitor::over(Arc::new(local));
        monitor.register_service(complement()).unwrap();
        let sink = Arc::new(Collect::default());
        monitor.add_sink(CHANNEL_LI_DATA, sink.clone()).unwrap();
        assert!(monitor.add_sink(CHANNEL_SERVER, sink.clone()).is_err());

        remote.write(&Message::request(7, 1).with_u16(0xABCD)).unwrap();
        remote.write(&Message::new(CHANNEL_LI_DATA, 3, 0).with_u8(9)).unwrap();
        remote.write(&Message::new(9, 0, 0)).unwrap();
        remote.write(&Message::request(99, 0)).unwrap();

        while monitor.poll_once().unwrap() {}

        let resp = remote.read().unwrap();
        assert_eq!(resp.channel_id, CHANNEL_CLIENT);
        assert_eq!(resp.reader().u16().unwrap(), 0x5432);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
        assert_eq!(
            monitor.stats(),
            MonitorStats { requests: 2, responses: 1, delivered: 1, dropped: 1, errors: 1 }
        );
    }

    #[test]
    fn test_spawned_monitor_serves_both_directions() {
        let (local, remote) = ChunkedChannel::loopback_pair();
        let (mut system, mut monitor) = Monitor::over(Arc::new(local));
        monitor.register_service(complement()).unwrap();
        let running = monitor.spawn(fast()).unwrap();

        // Remote answers our system request only after calling one of our services
        let peer = thread::spawn(move || {
            let sys_req = remote.read().unwrap();
            remote.write(&Message::request(7, 1).with_u16(0x00FF)).unwrap();
            let resp = remote.read().unwrap();
            assert_eq!(resp.reader().u16().unwrap(), 0xFF00);
            remote.write(&Message::response_to(&sys_req, vec![1, 2, 3])).unwrap();
            remote
        });

        let resp = system.make_request(Message::request(20, 2)).unwrap();
        assert_eq!(resp.payload, vec![1, 2, 3]);
        let _remote = peer.join().unwrap();

        let monitor = running.shutdown().unwrap();
        let stats = MemoryStats::new();
        monitor.report_stats(&stats);
        assert_eq!(stats.get("rrr.monitor.requests"), Some(1));
        assert_eq!(stats.get("rrr.complement.invert.calls"), Some(1));
    }

    #[test]
    fn test_monitor_exits_on_disconnect() {
        let (local, remote) = ChunkedChannel::loopback_pair();
        let (mut system, monitor) = Monitor::over(Arc::new(local));
        let running = monitor.spawn(fast()).unwrap();
        remote.device().close();
        let monitor = running.shutdown().unwrap();
        drop(monitor);
        assert_eq!(system.make_request(Message::request(1, 1)), Err(RrrError::Disconnected));
    }
}
