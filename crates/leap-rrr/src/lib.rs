//! # leap-rrr
//!
//! Remote-request-response transport: many services multiplexed over one
//! physical channel.
//!
//! ## Layers
//!
//! - `framing` / `device` / `physical` - messages cut into 16-byte chunks
//!   and moved by a `ChunkDevice`
//! - `client` - blocking requests from the system thread and the monitor
//! - `service` / `monitor` - dispatch of inbound requests, and the thread
//!   that reads the channel
//! - `assertions` - built-in assertion service
//!
//! ```rust,ignore
//! use leap_rrr::{ChunkedChannel, Message, Monitor, MonitorConfig, ServiceStub};
//!
//! let (local, remote) = ChunkedChannel::loopback_pair();
//! let (mut system, mut monitor) = Monitor::over(Arc::new(local));
//! monitor.register_service(Box::new(ServiceStub::new(7, "math")))?;
//! let running = monitor.spawn(MonitorConfig::from_env())?;
//! let resp = system.make_request(Message::request(7, 1).with_u16(0xABCD))?;
//! ```

pub mod assertions;
pub mod client;
pub mod device;
pub mod error;
pub mod framing;
pub mod message;
pub mod monitor;
pub mod physical;
pub mod service;

pub use assertions::{AssertionsService, Severity, ASSERTIONS_SERVICE_ID};
pub use client::{RrrClient, ServiceHandle, SystemHandle};
pub use device::{ChunkDevice, LoopbackDevice};
pub use error::{RrrError, RrrResult};
pub use framing::{encode_chunks, Chunk, Reassembler, CHUNK_BYTES};
pub use message::{
    chunks_for_payload, Message, PayloadReader, CHANNEL_CLIENT, CHANNEL_LI_CREDIT,
    CHANNEL_LI_DATA, CHANNEL_SERVER,
};
pub use monitor::{InboundSink, Monitor, MonitorConfig, MonitorHandle, MonitorStats};
pub use physical::{ChunkedChannel, PhysicalChannel};
pub use service::{RrrService, ServiceStub, ServiceTable};
