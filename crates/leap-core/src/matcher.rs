//! Named channel matcher
//!
//! One-shot directory used during elaboration: a SEND and a RECV that
//! register under the same name are bound as soon as the second one
//! arrives. Anything still pending at route time is reported as dangling.
//!
//! Runs once per channel, so a single mutex over two ordered maps is all
//! the concurrency control it needs.

use crate::channel::{self, LiRecv, LiSend, RecvLink, SendLink, LINC_QUEUE_DEPTH};
use crate::error::{ChannelSide, LeapError, LeapResult};
use crate::{kdebug, kerror, kwarn};

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Outcome of registering a named half-channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matched {
    /// A peer was waiting; both ends are now connected. Holds the peer's name.
    Bound(String),
    /// No peer yet; the endpoint is pending
    Pending,
}

/// A named endpoint nobody matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingChannel {
    pub name: String,
    pub side: ChannelSide,
    pub type_name: &'static str,
}

/// What a router resolved
#[derive(Debug, Clone, Default)]
pub struct RouteReport {
    pub bound: usize,
    pub dangling: Vec<DanglingChannel>,
}

/// Something the context asks to resolve its channels during `route()`
pub trait ChannelRouter: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve what can be resolved and report the rest. Must not fail:
    /// dangling channels are tolerated.
    fn route(&self) -> RouteReport;
}

struct Pending {
    type_id: TypeId,
    type_name: &'static str,
    link: Box<dyn Any + Send + Sync>,
}

impl Pending {
    fn new<L: Any + Send + Sync, T: 'static>(link: L) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            link: Box::new(link),
        }
    }
}

#[derive(Default)]
struct Tables {
    sends: BTreeMap<String, Pending>,
    recvs: BTreeMap<String, Pending>,
    bound: usize,
}

pub struct ChannelMatcher {
    depth: usize,
    tables: Mutex<Tables>,
}

impl Default for ChannelMatcher {
    fn default() -> Self {
        Self::new(LINC_QUEUE_DEPTH)
    }
}

impl ChannelMatcher {
    /// Matcher whose bound channels get queues of `depth` entries
    pub fn new(depth: usize) -> Self {
        Self { depth, tables: Mutex::new(Tables::default()) }
    }

    pub fn queue_depth(&self) -> usize {
        self.depth
    }

    /// Create a named SEND and register it
    pub fn send<T: Send + 'static>(&self, name: &str) -> LeapResult<LiSend<T>> {
        let send = LiSend::new(name);
        self.register_send(&send)?;
        Ok(send)
    }

    /// Create a named RECV and register it
    pub fn recv<T: Send + 'static>(&self, name: &str) -> LeapResult<LiRecv<T>> {
        let recv = LiRecv::new(name);
        self.register_recv(&recv)?;
        Ok(recv)
    }

    /// Register a SEND. A duplicate name or a payload type clash is fatal
    /// to elaboration and is logged here.
    pub fn register_send<T: Send + 'static>(&self, send: &LiSend<T>) -> LeapResult<Matched> {
        self.bind_send(send).inspect_err(|e| kerror!("matcher: {}", e))
    }

    /// Register a RECV; failures are logged like `register_send`
    pub fn register_recv<T: Send + 'static>(&self, recv: &LiRecv<T>) -> LeapResult<Matched> {
        self.bind_recv(recv).inspect_err(|e| kerror!("matcher: {}", e))
    }

    fn bind_send<T: Send + 'static>(&self, send: &LiSend<T>) -> LeapResult<Matched> {
        let name = send.name().to_string();
        let mut tables = self.tables.lock().unwrap();

        if let Some(peer) = tables.recvs.get(&name) {
            if peer.type_id != TypeId::of::<T>() {
                return Err(LeapError::TypeMismatch {
                    name,
                    send_type: std::any::type_name::<T>(),
                    recv_type: peer.type_name,
                });
            }
            let peer = tables.recvs.remove(&name).map(|p| p.link);
            if let Some(recv) = peer.and_then(|l| l.downcast::<Arc<RecvLink<T>>>().ok()) {
                channel::link(&send.link, &recv, self.depth);
                tables.bound += 1;
                kdebug!("matcher: bound '{}'", name);
                return Ok(Matched::Bound(recv.name.clone()));
            }
        }

        if tables.sends.contains_key(&name) {
            return Err(LeapError::DuplicateChannel { name, side: ChannelSide::Send });
        }
        tables
            .sends
            .insert(name, Pending::new::<_, T>(Arc::clone(&send.link)));
        Ok(Matched::Pending)
    }

    fn bind_recv<T: Send + 'static>(&self, recv: &LiRecv<T>) -> LeapResult<Matched> {
        let name = recv.name().to_string();
        let mut tables = self.tables.lock().unwrap();

        if let Some(peer) = tables.sends.get(&name) {
            if peer.type_id != TypeId::of::<T>() {
                return Err(LeapError::TypeMismatch {
                    name,
                    send_type: peer.type_name,
                    recv_type: std::any::type_name::<T>(),
                });
            }
            let peer = tables.sends.remove(&name).map(|p| p.link);
            if let Some(send) = peer.and_then(|l| l.downcast::<Arc<SendLink<T>>>().ok()) {
                channel::link(&send, &recv.link, self.depth);
                tables.bound += 1;
                kdebug!("matcher: bound '{}'", name);
                return Ok(Matched::Bound(send.name.clone()));
            }
        }

        if tables.recvs.contains_key(&name) {
            return Err(LeapError::DuplicateChannel { name, side: ChannelSide::Recv });
        }
        tables
            .recvs
            .insert(name, Pending::new::<_, T>(Arc::clone(&recv.link)));
        Ok(Matched::Pending)
    }

    /// Number of endpoints still waiting for a peer
    pub fn pending(&self) -> usize {
        let tables = self.tables.lock().unwrap();
        tables.sends.len() + tables.recvs.len()
    }

    pub fn bound(&self) -> usize {
        self.tables.lock().unwrap().bound
    }

    pub fn dangling(&self) -> Vec<DanglingChannel> {
        let tables = self.tables.lock().unwrap();
        let sends = tables.sends.iter().map(|(name, p)| DanglingChannel {
            name: name.clone(),
            side: ChannelSide::Send,
            type_name: p.type_name,
        });
        let recvs = tables.recvs.iter().map(|(name, p)| DanglingChannel {
            name: name.clone(),
            side: ChannelSide::Recv,
            type_name: p.type_name,
        });
        sends.chain(recvs).collect()
    }
}

impl ChannelRouter for ChannelMatcher {
    fn name(&self) -> &str {
        "li-matcher"
    }

    fn route(&self) -> RouteReport {
        let dangling = self.dangling();
        for d in &dangling {
            kwarn!("route: dangling {} '{}' ({})", d.side, d.name, d.type_name);
        }
        RouteReport { bound: self.bound(), dangling }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_then_recv_binds() {
        let m = ChannelMatcher::new(4);
        let tx = m.send::<u32>("x").unwrap();
        assert_eq!(m.pending(), 1);
        let rx = LiRecv::<u32>::new("x");
        assert_eq!(m.register_recv(&rx).unwrap(), Matched::Bound("x".into()));
        assert_eq!(m.pending(), 0);
        assert_eq!(m.bound(), 1);

        tx.enq(42);
        assert_eq!(rx.peek(), Some(42));
    }

    #[test]
    fn test_recv_then_send_binds() {
        let m = ChannelMatcher::default();
        let rx = m.recv::<String>("name").unwrap();
        let tx = m.send::<String>("name").unwrap();
        tx.enq("hi".to_string());
        assert_eq!(rx.deq().as_deref(), Some("hi"));
        assert_eq!(m.queue_depth(), LINC_QUEUE_DEPTH);
    }

    #[test]
    fn test_duplicate_same_side_fails() {
        let m = ChannelMatcher::default();
        let _a = m.send::<u8>("dup").unwrap();
        let before = crate::kprint::errors_logged();
        let err = m.send::<u8>("dup").unwrap_err();
        assert!(crate::kprint::errors_logged() > before);
        assert_eq!(
            err,
            LeapError::DuplicateChannel { name: "dup".into(), side: ChannelSide::Send }
        );
    }

    #[test]
    fn test_type_mismatch_fails() {
        let m = ChannelMatcher::default();
        let _tx = m.send::<u8>("t").unwrap();
        let before = crate::kprint::errors_logged();
        match m.recv::<u64>("t") {
            Err(LeapError::TypeMismatch { name, .. }) => assert_eq!(name, "t"),
            other => panic!("expected type mismatch, got {:?}", other.map(|_| ())),
        }
        assert!(crate::kprint::errors_logged() > before);
        // The pending SEND is untouched
        assert_eq!(m.pending(), 1);
    }

    #[test]
    fn test_route_reports_dangling() {
        let m = ChannelMatcher::default();
        let _tx = m.send::<u8>("lonely-send").unwrap();
        let _rx = m.recv::<u16>("lonely-recv").unwrap();
        let _a = m.send::<u8>("pair").unwrap();
        let _b = m.recv::<u8>("pair").unwrap();

        let report = m.route();
        assert_eq!(report.bound, 1);
        let names: Vec<_> = report.dangling.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["lonely-send", "lonely-recv"]);
        assert_eq!(report.dangling[1].side, ChannelSide::Recv);
    }
}
