//! RRR echo example
//!
//! Two ends of an in-memory link. The "remote" end hosts a complement
//! service and echoes a flow-controlled channel; the local platform calls
//! the service from the system thread and streams messages through the
//! echo.
//!
//! # Environment Variables
//!
//! - `LEAP_LOG_LEVEL=debug` - Log level
//! - `LEAP_CHANIO_CREDITS=<n>` - Chunk credits per channel
//! - `LEAP_ECHO_COUNT=<n>` - Messages streamed through the echo (default 200)

use leap::{
    env_get, kinfo, log_exit_hook, ChanioConfig, ChannelIo, ChunkedChannel, LeapError,
    LeapResult, Message, Monitor, MonitorConfig, Platform, RuntimeConfig, ServiceStub,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const COMPLEMENT_SERVICE: u16 = 7;
const METHOD_INVERT: u16 = 1;

fn complement_service() -> ServiceStub {
    ServiceStub::new(COMPLEMENT_SERVICE, "complement").method(METHOD_INVERT, "invert", |req| {
        let v = req.reader().u16()?;
        Ok(Some((!v).to_le_bytes().to_vec()))
    })
}

/// The far side of the link: services plus an echo loop on channel I/O
fn remote(end: ChunkedChannel<leap::LoopbackDevice>, count: u64) -> LeapResult<()> {
    let end = Arc::new(end);
    let (_system, mut monitor) = Monitor::over(end.clone());
    monitor.register_service(Box::new(complement_service()))?;

    let io = ChannelIo::new("remote", end, ChanioConfig::from_env())?;
    let requests = io.inbound("echo-req")?;
    let replies = io.outbound("echo-resp")?;
    io.attach(&mut monitor)?;
    let running = monitor.spawn(MonitorConfig::from_env())?;

    for _ in 0..count {
        let msg = requests.pop();
        replies.push(msg)?;
    }
    let monitor = running.shutdown()?;
    kinfo!("remote: {:?}", monitor.stats());
    Ok(())
}

// LEAP_LOG_LEVEL=info cargo run -p leap-rrr-echo
fn main() -> LeapResult<()> {
    println!("=== LEAP RRR Echo Example ===\n");

    let count: u64 = env_get("LEAP_ECHO_COUNT", 200);
    let (local, far) = ChunkedChannel::loopback_pair();
    let far = thread::Builder::new()
        .name("remote".into())
        .spawn(move || remote(far, count))
        .map_err(|e| LeapError::WorkerSpawn(e.to_string()))?;

    let mut platform = Platform::with_link(
        RuntimeConfig::from_env(),
        Arc::new(local),
        ChanioConfig::from_env(),
        log_exit_hook(),
    )?;
    let io = platform
        .chanio()
        .ok_or_else(|| LeapError::Transport("platform has no link".into()))?;
    let (tx, rx) = (io.outbound("echo-req")?, io.inbound("echo-resp")?);
    platform.start_monitor(MonitorConfig::from_env())?;

    // Blocking RPC from the system thread
    if let Some(system) = platform.system() {
        let resp = system.make_request(
            Message::request(COMPLEMENT_SERVICE, METHOD_INVERT).with_u16(0xABCD),
        )?;
        println!("invert(0xABCD) = {:#06x}", resp.reader().u16()?);
    }

    // Stream through the echo; the producer thread blocks on credits
    let start = Instant::now();
    let producer = thread::spawn(move || -> LeapResult<()> {
        for i in 0..count {
            tx.push(i.to_le_bytes().to_vec())?;
        }
        Ok(())
    });
    let mut expected = 0u64;
    while expected < count {
        match rx.pop_timeout(Duration::from_secs(5)) {
            Some(payload) => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&payload[..8]);
                assert_eq!(u64::from_le_bytes(bytes), expected, "echo out of order");
                expected += 1;
            }
            None => {
                println!("WARNING: echo timed out after {} messages", expected);
                break;
            }
        }
    }
    let _ = producer.join();
    println!("{} messages echoed in {:?}", expected, start.elapsed());

    platform.shutdown()?;
    if let Ok(Err(e)) = far.join() {
        println!("remote failed: {}", e);
    }
    println!("\n=== Example Complete ===");
    Ok(())
}
