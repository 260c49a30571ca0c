//! RRR client: blocking requests over a shared physical channel
//!
//! Only one thread may read the physical channel. That reader is the
//! service (monitor) thread, which holds the `ServiceHandle`. Every other
//! caller goes through the `SystemHandle`: it writes its request and then
//! sleeps on a one-slot response buffer that the service thread fills when
//! the matching response comes in.
//!
//! Both handles take `&mut self` to issue a request, so each side can have
//! at most one synchronous request outstanding.

use crate::error::{RrrError, RrrResult};
use crate::message::{Message, CHANNEL_CLIENT};
use crate::physical::PhysicalChannel;
use leap_core::{kdebug, kerror};

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

#[derive(Default)]
struct Slot {
    /// Key of the system request waiting for its response
    outstanding: Option<(u16, u16)>,
    response: Option<Message>,
    closed: bool,
}

struct Shared {
    channel: Arc<dyn PhysicalChannel>,
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl Shared {
    /// Hand a response to the waiting system thread
    fn deliver_to_slot(&self, msg: Message) -> RrrResult<()> {
        let mut slot = self.slot.lock().unwrap();
        let expected = slot.outstanding;
        if expected != Some(msg.key()) || slot.response.is_some() {
            kerror!(
                "rrr: response svc={} mth={} does not match outstanding {:?} (slot {})",
                msg.service_id,
                msg.method_id,
                expected,
                if slot.response.is_some() { "full" } else { "empty" }
            );
            return Err(RrrError::UnexpectedResponse {
                service: msg.service_id,
                method: msg.method_id,
            });
        }
        slot.response = Some(msg);
        self.ready.notify_all();
        Ok(())
    }

    fn close(&self) {
        let mut slot = self.slot.lock().unwrap();
        if !slot.closed {
            slot.closed = true;
            self.ready.notify_all();
        }
    }
}

pub struct RrrClient;

impl RrrClient {
    /// Split a physical channel into its system-side and service-side handles
    pub fn new(channel: Arc<dyn PhysicalChannel>) -> (SystemHandle, ServiceHandle) {
        let shared = Arc::new(Shared {
            channel,
            slot: Mutex::new(Slot::default()),
            ready: Condvar::new(),
        });
        (
            SystemHandle { shared: Arc::clone(&shared) },
            ServiceHandle { shared, deferred: VecDeque::new(), stray: 0 },
        )
    }
}

/// Request handle for threads that never read the channel
pub struct SystemHandle {
    shared: Arc<Shared>,
}

impl SystemHandle {
    /// Send `req` and block until the service thread hands back the
    /// response with the same service and method id.
    pub fn make_request(&mut self, req: Message) -> RrrResult<Message> {
        {
            let mut slot = self.shared.slot.lock().unwrap();
            if slot.closed {
                return Err(RrrError::Disconnected);
            }
            debug_assert!(slot.outstanding.is_none(), "second outstanding system request");
            slot.outstanding = Some(req.key());
            slot.response = None;
        }

        if let Err(e) = self.shared.channel.write(&req) {
            self.shared.slot.lock().unwrap().outstanding = None;
            return Err(e);
        }

        let mut slot = self.shared.slot.lock().unwrap();
        loop {
            if let Some(resp) = slot.response.take() {
                slot.outstanding = None;
                return Ok(resp);
            }
            if slot.closed {
                slot.outstanding = None;
                return Err(RrrError::Disconnected);
            }
            slot = self.shared.ready.wait(slot).unwrap();
        }
    }

    pub fn make_request_no_response(&self, req: &Message) -> RrrResult<()> {
        self.shared.channel.write(req)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.slot.lock().unwrap().closed
    }
}

/// Handle owned by the one thread allowed to read the channel
pub struct ServiceHandle {
    shared: Arc<Shared>,
    /// Inbound messages read while waiting for our own response
    deferred: VecDeque<Message>,
    /// Client responses that matched no outstanding request
    stray: u64,
}

impl ServiceHandle {
    /// Send `req` and read the channel until its response shows up.
    ///
    /// Responses for the system thread met on the way go to its slot;
    /// anything that is not a client response is kept and handed out by
    /// later `poll` calls. A response nobody asked for is logged, counted
    /// in `stray_responses`, and skipped.
    pub fn make_request(&mut self, req: Message) -> RrrResult<Message> {
        let key = req.key();
        self.shared.channel.write(&req)?;
        loop {
            let msg = self.shared.channel.read()?;
            if msg.channel_id != CHANNEL_CLIENT {
                self.deferred.push_back(msg);
                continue;
            }
            if msg.key() == key {
                return Ok(msg);
            }
            if self.shared.deliver_to_slot(msg).is_err() {
                self.stray += 1;
            }
        }
    }

    pub fn make_request_no_response(&self, req: &Message) -> RrrResult<()> {
        self.shared.channel.write(req)
    }

    /// One non-blocking step: a deferred message if there is one, else one
    /// read from the channel. Client responses are consumed here and never
    /// returned.
    pub fn poll(&mut self) -> RrrResult<Option<Message>> {
        if let Some(msg) = self.deferred.pop_front() {
            return Ok(Some(msg));
        }
        match self.shared.channel.try_read()? {
            Some(msg) => self.accept(msg),
            None => Ok(None),
        }
    }

    /// Route a message read elsewhere: client responses go to the system
    /// slot, everything else is handed back.
    pub fn accept(&mut self, msg: Message) -> RrrResult<Option<Message>> {
        if msg.channel_id == CHANNEL_CLIENT {
            self.shared.deliver_to_slot(msg)?;
            Ok(None)
        } else {
            Ok(Some(msg))
        }
    }

    /// Write a message without waiting for anything (responses, data)
    pub fn write(&self, msg: &Message) -> RrrResult<()> {
        self.shared.channel.write(msg)
    }

    pub fn deferred(&self) -> usize {
        self.deferred.len()
    }

    pub fn stray_responses(&self) -> u64 {
        self.stray
    }

    /// True while a system request is waiting for its response
    pub fn system_request_pending(&self) -> bool {
        self.shared.slot.lock().unwrap().outstanding.is_some()
    }

    /// Fail any blocked and future system requests with `Disconnected`
    pub fn close(&self) {
        kdebug!("rrr: client closed");
        self.shared.close();
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.shared.close();
    }
}
