//! Server-side dispatch
//!
//! Every service owns a 16-bit id and answers requests addressed to it.
//! Generated stubs plug in through `RrrService`; `ServiceStub` covers the
//! common case of a plain method-id → handler table.

use crate::error::{RrrError, RrrResult};
use crate::message::Message;
use leap_core::{kdebug, kwarn, StatsSink};

use std::collections::BTreeMap;

pub trait RrrService: Send {
    fn service_id(&self) -> u16;

    fn name(&self) -> &str;

    /// Handle one request. `Some(payload)` is sent back as the response;
    /// `None` means the method has no response.
    fn request(&mut self, req: &Message) -> RrrResult<Option<Vec<u8>>>;

    /// Called on every monitor iteration, for services with background work
    fn poll(&mut self) -> RrrResult<()> {
        Ok(())
    }

    fn report_stats(&self, _sink: &dyn StatsSink) {}
}

type Handler = Box<dyn FnMut(&Message) -> RrrResult<Option<Vec<u8>>> + Send>;

struct Method {
    name: String,
    handler: Handler,
    calls: u64,
}

/// Method table service
pub struct ServiceStub {
    id: u16,
    name: String,
    methods: BTreeMap<u16, Method>,
}

impl ServiceStub {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), methods: BTreeMap::new() }
    }

    /// Add a handler for `method_id`. A later handler for the same id
    /// replaces the earlier one.
    pub fn method<F>(mut self, method_id: u16, name: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&Message) -> RrrResult<Option<Vec<u8>>> + Send + 'static,
    {
        let method = Method { name: name.into(), handler: Box::new(handler), calls: 0 };
        if let Some(old) = self.methods.insert(method_id, method) {
            kwarn!("service {}: method {} ('{}') replaced", self.name, method_id, old.name);
        }
        self
    }

    pub fn calls(&self, method_id: u16) -> u64 {
        self.methods.get(&method_id).map_or(0, |m| m.calls)
    }
}

impl RrrService for ServiceStub {
    fn service_id(&self) -> u16 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn request(&mut self, req: &Message) -> RrrResult<Option<Vec<u8>>> {
        let method = self.methods.get_mut(&req.method_id).ok_or(RrrError::UnknownMethod {
            service: self.id,
            method: req.method_id,
        })?;
        method.calls += 1;
        (method.handler)(req)
    }

    fn report_stats(&self, sink: &dyn StatsSink) {
        for m in self.methods.values() {
            sink.report(&format!("rrr.{}.{}.calls", self.name, m.name), m.calls);
        }
    }
}

/// Registered services keyed by id
#[derive(Default)]
pub struct ServiceTable {
    services: BTreeMap<u16, Box<dyn RrrService>>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: Box<dyn RrrService>) -> RrrResult<()> {
        let id = service.service_id();
        if self.services.contains_key(&id) {
            return Err(RrrError::DuplicateService(id));
        }
        kdebug!("rrr: service {} '{}' registered", id, service.name());
        self.services.insert(id, service);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn contains(&self, service_id: u16) -> bool {
        self.services.contains_key(&service_id)
    }

    /// Run the handler for `req`; the response message, if the method has one
    pub fn dispatch(&mut self, req: &Message) -> RrrResult<Option<Message>> {
        let service = self
            .services
            .get_mut(&req.service_id)
            .ok_or(RrrError::UnknownService(req.service_id))?;
        let payload = service.request(req)?;
        Ok(payload.map(|p| Message::response_to(req, p)))
    }

    /// Give every service its background tick; the first error stops the round
    pub fn poll_all(&mut self) -> RrrResult<()> {
        for service in self.services.values_mut() {
            service.poll()?;
        }
        Ok(())
    }

    pub fn report_stats(&self, sink: &dyn StatsSink) {
        for service in self.services.values() {
            service.report_stats(sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CHANNEL_CLIENT;
    use leap_core::MemoryStats;

    fn complement() -> ServiceStub {
        ServiceStub::new(7, "complement")
            .method(1, "invert", |req| {
                let v = req.reader().u16()?;
                Ok(Some((!v).to_le_bytes().to_vec()))
            })
            .method(2, "ping", |_| Ok(None))
    }

    #[test]
    fn test_dispatch_builds_response() {
        let mut table = ServiceTable::new();
        table.register(Box::new(complement())).unwrap();

        let req = Message::request(7, 1).with_u16(0xABCD);
        let resp = table.dispatch(&req).unwrap().unwrap();
        assert_eq!(resp.channel_id, CHANNEL_CLIENT);
        assert_eq!(resp.key(), (7, 1));
        assert_eq!(resp.reader().u16().unwrap(), 0x5432);

        assert_eq!(table.dispatch(&Message::request(7, 2)).unwrap(), None);
    }

    #[test]
    fn test_unknown_ids() {
        let mut table = ServiceTable::new();
        table.register(Box::new(complement())).unwrap();
        assert_eq!(
            table.dispatch(&Message::request(8, 1)),
            Err(RrrError::UnknownService(8))
        );
        assert_eq!(
            table.dispatch(&Message::request(7, 99)),
            Err(RrrError::UnknownMethod { service: 7, method: 99 })
        );
        // Short payload surfaces as the handler's error
        assert!(matches!(
            table.dispatch(&Message::request(7, 1)),
            Err(RrrError::ShortPayload { .. })
        ));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut table = ServiceTable::new();
        table.register(Box::new(complement())).unwrap();
        assert_eq!(
            table.register(Box::new(ServiceStub::new(7, "other"))),
            Err(RrrError::DuplicateService(7))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_call_counters_reported() {
        let mut stub = complement();
        stub.request(&Message::request(7, 2)).unwrap();
        stub.request(&Message::request(7, 2)).unwrap();
        assert_eq!(stub.calls(2), 2);

        let stats = MemoryStats::new();
        stub.report_stats(&stats);
        assert_eq!(stats.get("rrr.complement.ping.calls"), Some(2));
        assert_eq!(stats.get("rrr.complement.invert.calls"), Some(0));
    }
}
