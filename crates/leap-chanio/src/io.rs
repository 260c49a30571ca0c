//! Channel I/O over one physical link
//!
//! Named directional channels share a physical channel. Ids are handed out
//! in registration order per direction, so both ends of a link must
//! declare their channels in the same order: outbound channel `k` on one
//! side is inbound channel `k` on the other.
//!
//! Wire format:
//!
//! - data: `CHANNEL_LI_DATA`, service = channel id, payload = user bytes
//! - credit return: `CHANNEL_LI_CREDIT`, service = channel id,
//!   payload = `u32` chunk count
//!
//! Inbound messages reach this layer through the monitor (`InboundSink`);
//! it never reads the physical channel itself.

use crate::config::ChanioConfig;
use crate::credit::CreditCounter;
use crate::error::{ChanioError, ChanioResult};
use leap_core::{
    kdebug, kerror, kinfo, kwarn, BoundedQueue, ChannelRouter, RouteReport, StatsSink, TryPushError,
};
use leap_rrr::{
    chunks_for_payload, InboundSink, Message, Monitor, PhysicalChannel, RrrError, RrrResult,
    CHANNEL_LI_CREDIT, CHANNEL_LI_DATA,
};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Credits a payload of this size costs
pub(crate) fn chunks_of(payload: &[u8]) -> u32 {
    chunks_for_payload(payload.len()) as u32
}

/// A forwarded message waiting for downstream credit
struct Forwarded {
    payload: Vec<u8>,
    chunks: u32,
    upstream: Arc<InboundLink>,
}

pub(crate) struct OutboundLink {
    id: u16,
    name: String,
    pub(crate) credits: CreditCounter,
    physical: Arc<dyn PhysicalChannel>,
    backlog: Mutex<VecDeque<Forwarded>>,
    sent: AtomicU64,
    credit_stalls: AtomicU64,
    backlog_peak: AtomicUsize,
}

impl OutboundLink {
    /// Write a data message whose credits are already held. On failure the
    /// credits are returned and the payload handed back.
    pub(crate) fn send(&self, payload: Vec<u8>, chunks: u32) -> Result<(), (RrrError, Vec<u8>)> {
        let msg = Message::new(CHANNEL_LI_DATA, self.id, 0).with_payload(payload);
        if let Err(e) = self.physical.write(&msg) {
            self.credits.free(chunks);
            return Err((e, msg.payload));
        }
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn note_stall(&self) {
        self.credit_stalls.fetch_add(1, Ordering::Relaxed);
    }

    /// Route-through path: send now if credit allows and nothing is queued
    /// ahead, otherwise queue. Never blocks on credit.
    ///
    /// A message larger than this link's whole credit budget can never be
    /// sent. It is rejected with `TooLarge` and its upstream credits are
    /// returned, so it does not hold up the messages behind it.
    fn forward(&self, payload: Vec<u8>, upstream: &Arc<InboundLink>) -> ChanioResult<()> {
        let chunks = chunks_of(&payload);
        let budget = self.credits.initial();
        if chunks > budget {
            kerror!(
                "chanio: '{}' cannot forward {} chunks with {} credits; message rejected",
                self.name,
                chunks,
                budget
            );
            upstream.release(chunks)?;
            return Err(ChanioError::TooLarge { chunks, credits: budget });
        }

        let mut backlog = self.backlog.lock().unwrap();
        if backlog.is_empty() && self.credits.try_acquire(chunks) {
            match self.send(payload, chunks) {
                Ok(()) => {
                    drop(backlog);
                    return upstream.release(chunks);
                }
                Err((e, payload)) => {
                    // Keep it for the next drain
                    backlog.push_back(Forwarded { payload, chunks, upstream: Arc::clone(upstream) });
                    return Err(e.into());
                }
            }
        }
        self.note_stall();
        backlog.push_back(Forwarded { payload, chunks, upstream: Arc::clone(upstream) });
        self.backlog_peak.fetch_max(backlog.len(), Ordering::Relaxed);
        kdebug!("chanio: '{}' backlog {}", self.name, backlog.len());
        Ok(())
    }

    fn free_credits(&self, n: u32) -> ChanioResult<()> {
        self.credits.free(n);
        self.drain()
    }

    /// Send queued forwards while credit lasts, then return their upstream
    /// credits.
    fn drain(&self) -> ChanioResult<()> {
        let mut released = Vec::new();
        let result = {
            let mut backlog = self.backlog.lock().unwrap();
            let mut result = Ok(());
            while let Some(front) = backlog.front() {
                if !self.credits.try_acquire(front.chunks) {
                    break;
                }
                let Some(f) = backlog.pop_front() else { break };
                match self.send(f.payload, f.chunks) {
                    Ok(()) => released.push((f.upstream, f.chunks)),
                    Err((e, payload)) => {
                        backlog.push_front(Forwarded { payload, chunks: f.chunks, upstream: f.upstream });
                        result = Err(e.into());
                        break;
                    }
                }
            }
            result
        };
        let mut result = result;
        for (upstream, chunks) in released {
            if let Err(e) = upstream.release(chunks) {
                kerror!("chanio: '{}' credit return upstream failed: {}", self.name, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    fn backlog_len(&self) -> usize {
        self.backlog.lock().unwrap().len()
    }
}

pub(crate) struct InboundLink {
    id: u16,
    name: String,
    physical: Arc<dyn PhysicalChannel>,
    queue: BoundedQueue<Vec<u8>>,
    route: Option<Arc<OutboundLink>>,
    received: AtomicU64,
    returned: AtomicU64,
    /// Credits consumed but not yet handed back
    owed: AtomicU32,
}

impl InboundLink {
    /// Give `chunks` credits back to the sending side
    fn release(&self, chunks: u32) -> ChanioResult<()> {
        let msg = Message::new(CHANNEL_LI_CREDIT, self.id, 0).with_u32(chunks);
        self.physical.write(&msg)?;
        self.returned.fetch_add(chunks as u64, Ordering::Relaxed);
        Ok(())
    }

    fn accept(self: &Arc<Self>, payload: Vec<u8>) -> ChanioResult<()> {
        self.received.fetch_add(1, Ordering::Relaxed);
        match &self.route {
            Some(out) => out.forward(payload, self),
            None => self
                .queue
                .try_push(payload)
                .map_err(|_| ChanioError::Overflow(self.name.clone())),
        }
    }

    /// Account for a popped message. The payload always goes to the
    /// caller; a failed credit return stays owed and is retried on the next
    /// pop or `return_owed`.
    fn consumed(&self, payload: Vec<u8>) -> Vec<u8> {
        self.owed.fetch_add(chunks_of(&payload), Ordering::AcqRel);
        if let Err(e) = self.return_owed() {
            kwarn!("chanio: '{}' credit return deferred: {}", self.name, e);
        }
        payload
    }

    fn return_owed(&self) -> ChanioResult<()> {
        let owed = self.owed.swap(0, Ordering::AcqRel);
        if owed == 0 {
            return Ok(());
        }
        self.release(owed).inspect_err(|_| {
            self.owed.fetch_add(owed, Ordering::AcqRel);
        })
    }
}

struct Inner {
    name: String,
    physical: Arc<dyn PhysicalChannel>,
    config: ChanioConfig,
    outbound: RwLock<Vec<Arc<OutboundLink>>>,
    inbound: RwLock<Vec<Arc<InboundLink>>>,
}

/// Flow-controlled channels multiplexed over one physical link
#[derive(Clone)]
pub struct ChannelIo {
    inner: Arc<Inner>,
}

impl ChannelIo {
    pub fn new(
        name: impl Into<String>,
        physical: Arc<dyn PhysicalChannel>,
        config: ChanioConfig,
    ) -> ChanioResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                name: name.into(),
                physical,
                config,
                outbound: RwLock::new(Vec::new()),
                inbound: RwLock::new(Vec::new()),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ChanioConfig {
        &self.inner.config
    }

    /// Declare the next outbound channel
    pub fn outbound(&self, name: &str) -> ChanioResult<OutboundChannel> {
        let mut table = self.inner.outbound.write().unwrap();
        if table.iter().any(|l| l.name == name) {
            return Err(ChanioError::DuplicateName(name.to_string()));
        }
        let link = Arc::new(OutboundLink {
            id: table.len() as u16,
            name: name.to_string(),
            credits: CreditCounter::new(self.inner.config.credits),
            physical: Arc::clone(&self.inner.physical),
            backlog: Mutex::new(VecDeque::new()),
            sent: AtomicU64::new(0),
            credit_stalls: AtomicU64::new(0),
            backlog_peak: AtomicUsize::new(0),
        });
        kdebug!("chanio {}: outbound {} = '{}'", self.inner.name, link.id, name);
        table.push(Arc::clone(&link));
        Ok(OutboundChannel { link })
    }

    /// Declare the next inbound channel
    pub fn inbound(&self, name: &str) -> ChanioResult<InboundChannel> {
        let link = self.add_inbound(name, None)?;
        Ok(InboundChannel { link })
    }

    /// Declare the next inbound channel as a pass-through to `outbound`,
    /// usually on another link. Its messages are never decoded here.
    pub fn route_through(&self, name: &str, outbound: OutboundChannel) -> ChanioResult<RouteThrough> {
        let link = self.add_inbound(name, Some(Arc::clone(&outbound.link)))?;
        Ok(RouteThrough { inbound: link, outbound })
    }

    fn add_inbound(
        &self,
        name: &str,
        route: Option<Arc<OutboundLink>>,
    ) -> ChanioResult<Arc<InboundLink>> {
        let mut table = self.inner.inbound.write().unwrap();
        if table.iter().any(|l| l.name == name) {
            return Err(ChanioError::DuplicateName(name.to_string()));
        }
        let link = Arc::new(InboundLink {
            id: table.len() as u16,
            name: name.to_string(),
            physical: Arc::clone(&self.inner.physical),
            // The sender can never have more messages in flight than credits
            queue: BoundedQueue::new(self.inner.config.credits as usize),
            route,
            received: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            owed: AtomicU32::new(0),
        });
        kdebug!("chanio {}: inbound {} = '{}'", self.inner.name, link.id, name);
        table.push(Arc::clone(&link));
        Ok(link)
    }

    pub fn num_outbound(&self) -> usize {
        self.inner.outbound.read().unwrap().len()
    }

    pub fn num_inbound(&self) -> usize {
        self.inner.inbound.read().unwrap().len()
    }

    /// Handle one message from the link
    pub fn handle(&self, msg: Message) -> ChanioResult<()> {
        match msg.channel_id {
            CHANNEL_LI_DATA => {
                let link = self.inbound_link(msg.service_id)?;
                link.accept(msg.payload)
            }
            CHANNEL_LI_CREDIT => {
                let n = msg.reader().u32()?;
                self.outbound_link(msg.service_id)?.free_credits(n)
            }
            other => Err(ChanioError::UnexpectedChannel(other)),
        }
    }

    fn inbound_link(&self, id: u16) -> ChanioResult<Arc<InboundLink>> {
        self.inner
            .inbound
            .read()
            .unwrap()
            .get(id as usize)
            .cloned()
            .ok_or(ChanioError::UnknownChannel { direction: "inbound", id })
    }

    fn outbound_link(&self, id: u16) -> ChanioResult<Arc<OutboundLink>> {
        self.inner
            .outbound
            .read()
            .unwrap()
            .get(id as usize)
            .cloned()
            .ok_or(ChanioError::UnknownChannel { direction: "outbound", id })
    }

    /// Register for both channel I/O channel ids on `monitor`
    pub fn attach(&self, monitor: &mut Monitor) -> RrrResult<()> {
        monitor.add_sink(CHANNEL_LI_DATA, Arc::new(self.clone()))?;
        monitor.add_sink(CHANNEL_LI_CREDIT, Arc::new(self.clone()))
    }

    /// Fail blocked pushes with `Closed`
    pub fn close(&self) {
        for link in self.inner.outbound.read().unwrap().iter() {
            link.credits.close();
        }
    }

    pub fn report_stats(&self, sink: &dyn StatsSink) {
        let io = &self.inner.name;
        for l in self.inner.outbound.read().unwrap().iter() {
            sink.report(&format!("chanio.{}.{}.sent", io, l.name), l.sent.load(Ordering::Relaxed));
            sink.report(
                &format!("chanio.{}.{}.credit_stalls", io, l.name),
                l.credit_stalls.load(Ordering::Relaxed),
            );
            sink.report(
                &format!("chanio.{}.{}.backlog_peak", io, l.name),
                l.backlog_peak.load(Ordering::Relaxed) as u64,
            );
        }
        for l in self.inner.inbound.read().unwrap().iter() {
            sink.report(
                &format!("chanio.{}.{}.received", io, l.name),
                l.received.load(Ordering::Relaxed),
            );
        }
    }
}

impl InboundSink for ChannelIo {
    fn deliver(&self, msg: Message) -> RrrResult<()> {
        self.handle(msg).map_err(|e| {
            kerror!("chanio {}: {}", self.inner.name, e);
            RrrError::from(e)
        })
    }
}

impl ChannelRouter for ChannelIo {
    fn name(&self) -> &str {
        &self.inner.name
    }

    /// Channels here are bound by declaration order, so there is nothing
    /// left dangling to report; log the table instead.
    fn route(&self) -> RouteReport {
        let outbound = self.inner.outbound.read().unwrap();
        let inbound = self.inner.inbound.read().unwrap();
        for l in outbound.iter() {
            kinfo!("chanio {}: out {:>3} '{}'", self.inner.name, l.id, l.name);
        }
        for l in inbound.iter() {
            let kind = if l.route.is_some() { "route" } else { "in" };
            kinfo!("chanio {}: {:<5} {:>3} '{}'", self.inner.name, kind, l.id, l.name);
        }
        RouteReport { bound: outbound.len() + inbound.len(), dangling: Vec::new() }
    }
}

/// Sending end of a flow-controlled channel
pub struct OutboundChannel {
    pub(crate) link: Arc<OutboundLink>,
}

impl OutboundChannel {
    pub fn id(&self) -> u16 {
        self.link.id
    }

    pub fn name(&self) -> &str {
        &self.link.name
    }

    /// Send `payload`, blocking while the channel is out of credit
    pub fn push(&self, payload: Vec<u8>) -> ChanioResult<()> {
        let chunks = chunks_of(&payload);
        if !self.link.credits.try_acquire(chunks) {
            self.link.note_stall();
            self.link.credits.acquire(chunks)?;
        }
        self.link.send(payload, chunks).map_err(|(e, _)| e.into())
    }

    /// Send `payload` only if credit is available now; otherwise, or if the
    /// link refuses the write, the payload is handed back.
    pub fn try_push(&self, payload: Vec<u8>) -> Result<(), TryPushError<Vec<u8>>> {
        let chunks = chunks_of(&payload);
        if !self.link.credits.try_acquire(chunks) {
            self.link.note_stall();
            return Err(TryPushError(payload));
        }
        self.link.send(payload, chunks).map_err(|(e, payload)| {
            kerror!("chanio '{}': {}", self.link.name, e);
            TryPushError(payload)
        })
    }

    /// Return credits locally and drain any forwarded backlog
    pub fn free_credits(&self, n: u32) -> ChanioResult<()> {
        self.link.free_credits(n)
    }

    pub fn credits(&self) -> &CreditCounter {
        &self.link.credits
    }

    pub fn backlog_len(&self) -> usize {
        self.link.backlog_len()
    }
}

impl std::fmt::Debug for OutboundChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundChannel")
            .field("id", &self.link.id)
            .field("name", &self.link.name)
            .field("available", &self.link.credits.available())
            .finish()
    }
}

/// Receiving end of a flow-controlled channel
pub struct InboundChannel {
    link: Arc<InboundLink>,
}

impl InboundChannel {
    pub fn id(&self) -> u16 {
        self.link.id
    }

    pub fn name(&self) -> &str {
        &self.link.name
    }

    /// Next message, blocking until one arrives
    pub fn pop(&self) -> Vec<u8> {
        let payload = self.link.queue.pop();
        self.link.consumed(payload)
    }

    pub fn try_pop(&self) -> Option<Vec<u8>> {
        self.link.queue.try_pop().map(|p| self.link.consumed(p))
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.link.queue.pop_timeout(timeout).map(|p| self.link.consumed(p))
    }

    /// Retry handing back credits whose return message failed
    pub fn return_owed(&self) -> ChanioResult<()> {
        self.link.return_owed()
    }

    /// Credits consumed here that the sender has not been given back yet
    pub fn credits_owed(&self) -> u32 {
        self.link.owed.load(Ordering::Acquire)
    }

    /// Messages waiting to be popped
    pub fn peek_len(&self) -> usize {
        self.link.queue.len()
    }

    /// Total credits handed back to the sender
    pub fn credits_returned(&self) -> u64 {
        self.link.returned.load(Ordering::Relaxed)
    }
}

/// Inbound channel forwarded, undecoded, to an outbound channel
pub struct RouteThrough {
    inbound: Arc<InboundLink>,
    outbound: OutboundChannel,
}

impl RouteThrough {
    pub fn name(&self) -> &str {
        &self.inbound.name
    }

    pub fn outbound(&self) -> &OutboundChannel {
        &self.outbound
    }

    /// Messages waiting for downstream credit
    pub fn backlog_len(&self) -> usize {
        self.outbound.backlog_len()
    }

    pub fn forwarded(&self) -> u64 {
        self.inbound.received.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leap_core::MemoryStats;
    use leap_rrr::{ChunkedChannel, LoopbackDevice};

    type Link = ChunkedChannel<LoopbackDevice>;

    fn config(credits: u32) -> ChanioConfig {
        ChanioConfig::new().credits(credits)
    }

    fn io(name: &str, end: Link, credits: u32) -> (ChannelIo, Arc<Link>) {
        let end = Arc::new(end);
        let io = ChannelIo::new(name, end.clone(), config(credits)).unwrap();
        (io, end)
    }

    /// Feed everything waiting on `end` into `io`
    fn pump(end: &Link, io: &ChannelIo) -> usize {
        let mut n = 0;
        while let Some(msg) = end.try_read().unwrap() {
            io.handle(msg).unwrap();
            n += 1;
        }
        n
    }

    #[test]
    fn test_push_pop_returns_credits() {
        let (a, b) = ChunkedChannel::loopback_pair();
        let (tx_io, tx_end) = io("a", a, 4);
        let (rx_io, rx_end) = io("b", b, 4);
        let tx = tx_io.outbound("data").unwrap();
        let rx = rx_io.inbound("data").unwrap();

        // 2-byte payloads fit one chunk, 20-byte payloads take three
        tx.try_push(vec![1, 2]).unwrap();
        tx.try_push(vec![7; 20]).unwrap();
        assert_eq!(tx.credits().available(), 0);
        assert_eq!(tx.try_push(vec![3]), Err(TryPushError(vec![3])));

        assert_eq!(pump(&rx_end, &rx_io), 2);
        assert_eq!(rx.peek_len(), 2);
        assert_eq!(rx.try_pop(), Some(vec![1, 2]));
        assert_eq!(rx.pop(), vec![7; 20]);
        assert_eq!(rx.credits_returned(), 4);

        assert_eq!(pump(&tx_end, &tx_io), 2);
        assert_eq!(tx.credits().available(), 4);
        assert!(tx.credits().is_conserved());
    }

    #[test]
    fn test_ids_follow_registration_order() {
        let (a, _b) = ChunkedChannel::loopback_pair();
        let (io, _) = io("a", a, 4);
        assert_eq!(io.outbound("x").unwrap().id(), 0);
        assert_eq!(io.outbound("y").unwrap().id(), 1);
        assert_eq!(io.inbound("x").unwrap().id(), 0);
        assert!(matches!(io.outbound("y"), Err(ChanioError::DuplicateName(_))));
        assert_eq!(
            io.handle(Message::new(CHANNEL_LI_DATA, 5, 0)),
            Err(ChanioError::UnknownChannel { direction: "inbound", id: 5 })
        );
    }

    #[test]
    fn test_oversized_push_fails() {
        let (a, _b) = ChunkedChannel::loopback_pair();
        let (io, _) = io("a", a, 2);
        let tx = io.outbound("x").unwrap();
        assert_eq!(tx.push(vec![0; 100]), Err(ChanioError::TooLarge { chunks: 10, credits: 2 }));
    }

    #[test]
    fn test_blocking_push_resumes_on_credit() {
        let (a, b) = ChunkedChannel::loopback_pair();
        let (tx_io, tx_end) = io("a", a, 1);
        let (rx_io, rx_end) = io("b", b, 1);
        let tx = tx_io.outbound("c").unwrap();
        let rx = rx_io.inbound("c").unwrap();

        tx.push(vec![1]).unwrap();
        let sender = std::thread::spawn(move || tx.push(vec![2]).map(|_| tx));
        std::thread::sleep(Duration::from_millis(30));

        pump(&rx_end, &rx_io);
        assert_eq!(rx.pop(), vec![1]);
        pump(&tx_end, &tx_io);

        let tx = sender.join().unwrap().unwrap();
        pump(&rx_end, &rx_io);
        assert_eq!(rx.pop(), vec![2]);

        let stats = MemoryStats::new();
        tx_io.report_stats(&stats);
        assert_eq!(stats.get("chanio.a.c.sent"), Some(2));
        assert_eq!(stats.get("chanio.a.c.credit_stalls"), Some(1));
        drop(tx);
    }

    #[test]
    fn test_route_through_buffers_and_drains_in_order() {
        // a --link1--> b --link2--> c, two one-chunk credits per hop
        let (a_end, b_end1) = ChunkedChannel::loopback_pair();
        let (b_end2, c_end) = ChunkedChannel::loopback_pair();
        let (a_io, a_end) = io("a", a_end, 2);
        let (b1_io, b_end1) = io("b1", b_end1, 2);
        let (b2_io, b_end2) = io("b2", b_end2, 2);
        let (c_io, c_end) = io("c", c_end, 2);

        let tx = a_io.outbound("ac").unwrap();
        let hop = b1_io.route_through("ac", b2_io.outbound("ac").unwrap()).unwrap();
        let rx = c_io.inbound("ac").unwrap();

        tx.try_push(vec![0]).unwrap();
        tx.try_push(vec![1]).unwrap();
        // Downstream has credit: both go straight through and free upstream
        pump(&b_end1, &b1_io);
        assert_eq!(hop.backlog_len(), 0);
        pump(&a_end, &a_io);
        assert_eq!(tx.credits().available(), 2);

        tx.try_push(vec![2]).unwrap();
        tx.try_push(vec![3]).unwrap();
        // Downstream is out of credit: queued, upstream credit held
        pump(&b_end1, &b1_io);
        assert_eq!(hop.backlog_len(), 2);
        assert_eq!(pump(&a_end, &a_io), 0);
        assert!(tx.try_push(vec![4]).is_err());

        pump(&c_end, &c_io);
        assert_eq!(rx.try_pop(), Some(vec![0]));
        // The returned credit lets exactly one queued message through
        pump(&b_end2, &b2_io);
        assert_eq!(hop.backlog_len(), 1);
        assert_eq!(pump(&a_end, &a_io), 1);
        assert_eq!(tx.credits().available(), 1);

        assert_eq!(rx.try_pop(), Some(vec![1]));
        pump(&b_end2, &b2_io);
        assert_eq!(hop.backlog_len(), 0);
        pump(&c_end, &c_io);
        assert_eq!(rx.try_pop(), Some(vec![2]));
        assert_eq!(rx.try_pop(), Some(vec![3]));
        assert_eq!(hop.forwarded(), 4);
        assert!(tx.credits().is_conserved());
        assert!(hop.outbound().credits().is_conserved());
    }

    #[test]
    fn test_route_through_rejects_message_larger_than_downstream_budget() {
        // a --8 credits--> b1 | b2 --2 credits--> c
        let (a_end, b_end1) = ChunkedChannel::loopback_pair();
        let (b_end2, c_end) = ChunkedChannel::loopback_pair();
        let (a_io, a_end) = io("a", a_end, 8);
        let (b1_io, b_end1) = io("b1", b_end1, 8);
        let (b2_io, _b_end2) = io("b2", b_end2, 2);
        let (c_io, c_end) = io("c", c_end, 2);

        let tx = a_io.outbound("ac").unwrap();
        let hop = b1_io.route_through("ac", b2_io.outbound("ac").unwrap()).unwrap();
        let rx = c_io.inbound("ac").unwrap();

        // 30 bytes take four chunks, more than the second hop ever grants
        tx.try_push(vec![0xAB; 30]).unwrap();
        tx.try_push(vec![9]).unwrap();
        let mut results = Vec::new();
        while let Some(msg) = b_end1.try_read().unwrap() {
            results.push(b1_io.handle(msg));
        }
        assert_eq!(
            results,
            vec![Err(ChanioError::TooLarge { chunks: 4, credits: 2 }), Ok(())]
        );
        assert_eq!(hop.backlog_len(), 0);

        // Upstream gets every credit back, the small message still arrives
        assert_eq!(pump(&a_end, &a_io), 2);
        assert_eq!(tx.credits().available(), 8);
        assert!(tx.credits().is_conserved());
        pump(&c_end, &c_io);
        assert_eq!(rx.try_pop(), Some(vec![9]));
    }

    #[test]
    fn test_failed_credit_return_keeps_payload() {
        let (a, b) = ChunkedChannel::loopback_pair();
        let (tx_io, _tx_end) = io("a", a, 4);
        let (rx_io, rx_end) = io("b", b, 4);
        let tx = tx_io.outbound("d").unwrap();
        let rx = rx_io.inbound("d").unwrap();

        tx.try_push(vec![5]).unwrap();
        pump(&rx_end, &rx_io);
        rx_end.device().close();

        assert_eq!(rx.try_pop(), Some(vec![5]));
        assert_eq!(rx.credits_owed(), 1);
        assert_eq!(rx.credits_returned(), 0);
        assert!(rx.return_owed().is_err());
        assert_eq!(rx.credits_owed(), 1);
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_randomized_end_to_end_conservation() {
        let (a, b) = ChunkedChannel::loopback_pair();
        let (tx_io, tx_end) = io("a", a, 8);
        let (rx_io, rx_end) = io("b", b, 8);
        let tx = tx_io.outbound("r").unwrap();
        let rx = rx_io.inbound("r").unwrap();

        let mut seed: u64 = 42;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };
        let (mut sent, mut got) = (0u32, 0u32);
        for _ in 0..2_000 {
            match next() % 3 {
                0 => {
                    let len = next() % 40;
                    let mut payload = sent.to_le_bytes().to_vec();
                    payload.resize(4 + len, 0xEE);
                    if tx.try_push(payload).is_ok() {
                        sent += 1;
                    }
                }
                1 => {
                    pump(&rx_end, &rx_io);
                    if let Some(p) = rx.try_pop() {
                        assert_eq!(u32::from_le_bytes([p[0], p[1], p[2], p[3]]), got);
                        got += 1;
                    }
                }
                _ => {
                    pump(&tx_end, &tx_io);
                }
            }
            let c = tx.credits();
            assert!(c.is_conserved());
            assert!(c.in_flight() <= c.initial());
        }
        assert!(got <= sent);
    }
}
