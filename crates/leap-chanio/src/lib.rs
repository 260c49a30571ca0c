//! # leap-chanio
//!
//! Credit flow-controlled channels over an RRR physical link.
//!
//! Every directional channel has a budget of chunk credits. A sender spends
//! credits equal to the chunks a message occupies; the receiver returns
//! them once the message is consumed. Route-throughs forward another link's
//! traffic without decoding it and never block the reader doing so.
//!
//! ## Modules
//!
//! - `credit` - Credit counter
//! - `io` - `ChannelIo` and its inbound/outbound/route-through channels
//! - `multicast` - One payload to several outbound channels
//! - `config` - Credit budget configuration
//! - `error` - Error types

pub mod config;
pub mod credit;
pub mod error;
pub mod io;
pub mod multicast;

pub use config::ChanioConfig;
pub use credit::CreditCounter;
pub use error::{ChanioError, ChanioResult};
pub use io::{ChannelIo, InboundChannel, OutboundChannel, RouteThrough};
pub use multicast::MulticastGroup;
