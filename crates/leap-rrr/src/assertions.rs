//! Assertion service
//!
//! The other side of the link reports failed assertions as a string-table
//! id plus a severity. Messages and warnings are logged; an error-level
//! assertion runs the exit hook.

use crate::error::{RrrError, RrrResult};
use crate::message::Message;
use crate::service::RrrService;
use leap_core::{kerror, kinfo, kwarn, ExitHook, StatsSink, StringTable};

use std::sync::Arc;

pub const ASSERTIONS_SERVICE_ID: u16 = 1;
/// `(uid: u32, severity: u8)`, no response
pub const METHOD_ASSERT: u16 = 0;

/// Exit code used when a fatal assertion fires
pub const ASSERTION_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Severity {
    Message = 0,
    Warning = 1,
    Error = 2,
}

impl Severity {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Severity::Message),
            1 => Some(Severity::Warning),
            2 => Some(Severity::Error),
            _ => None,
        }
    }
}

pub struct AssertionsService {
    strings: Arc<StringTable>,
    exit: ExitHook,
    counts: [u64; 3],
}

impl AssertionsService {
    pub fn new(strings: Arc<StringTable>, exit: ExitHook) -> Self {
        Self { strings, exit, counts: [0; 3] }
    }

    pub fn count(&self, severity: Severity) -> u64 {
        self.counts[severity as usize]
    }

    /// Build the request the remote side would send
    pub fn assertion(uid: u32, severity: Severity) -> Message {
        Message::request(ASSERTIONS_SERVICE_ID, METHOD_ASSERT)
            .with_u32(uid)
            .with_u8(severity as u8)
    }

    fn raise(&mut self, uid: u32, severity: Severity) {
        self.counts[severity as usize] += 1;
        let text = self
            .strings
            .lookup(uid)
            .unwrap_or_else(|_| format!("<unknown assertion {}>", uid));
        match severity {
            Severity::Message => kinfo!("assertion: {}", text),
            Severity::Warning => kwarn!("assertion: {}", text),
            Severity::Error => {
                kerror!("assertion failed: {}", text);
                (self.exit)(ASSERTION_EXIT_CODE);
            }
        }
    }
}

impl RrrService for AssertionsService {
    fn service_id(&self) -> u16 {
        ASSERTIONS_SERVICE_ID
    }

    fn name(&self) -> &str {
        "assertions"
    }

    fn request(&mut self, req: &Message) -> RrrResult<Option<Vec<u8>>> {
        if req.method_id != METHOD_ASSERT {
            return Err(RrrError::UnknownMethod { service: ASSERTIONS_SERVICE_ID, method: req.method_id });
        }
        let mut r = req.reader();
        let uid = r.u32()?;
        let raw = r.u8()?;
        let severity = Severity::from_u8(raw)
            .ok_or_else(|| RrrError::Service(format!("bad assertion severity {}", raw)))?;
        self.raise(uid, severity);
        Ok(None)
    }

    fn report_stats(&self, sink: &dyn StatsSink) {
        sink.report("rrr.assertions.messages", self.counts[0]);
        sink.report("rrr.assertions.warnings", self.counts[1]);
        sink.report("rrr.assertions.errors", self.counts[2]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn service() -> (AssertionsService, Arc<AtomicI32>, u32) {
        let strings = Arc::new(StringTable::new());
        let uid = strings.add_string("fifo overflow in stage 2");
        let code = Arc::new(AtomicI32::new(-1));
        let hook: ExitHook = {
            let code = Arc::clone(&code);
            Arc::new(move |c| code.store(c, Ordering::SeqCst))
        };
        (AssertionsService::new(strings, hook), code, uid)
    }

    #[test]
    fn test_warning_does_not_exit() {
        let (mut svc, code, uid) = service();
        let resp = svc.request(&AssertionsService::assertion(uid, Severity::Warning)).unwrap();
        assert_eq!(resp, None);
        assert_eq!(svc.count(Severity::Warning), 1);
        assert_eq!(code.load(Ordering::SeqCst), -1);
    }

    #[test]
    fn test_error_runs_exit_hook() {
        let (mut svc, code, uid) = service();
        svc.request(&AssertionsService::assertion(uid, Severity::Error)).unwrap();
        assert_eq!(code.load(Ordering::SeqCst), ASSERTION_EXIT_CODE);
        // Unknown uids are still reported
        svc.request(&AssertionsService::assertion(999, Severity::Message)).unwrap();
        assert_eq!(svc.count(Severity::Message), 1);
    }

    #[test]
    fn test_malformed_requests() {
        let (mut svc, _, uid) = service();
        let bad = Message::request(ASSERTIONS_SERVICE_ID, METHOD_ASSERT).with_u32(uid).with_u8(7);
        assert!(matches!(svc.request(&bad), Err(RrrError::Service(_))));
        let short = Message::request(ASSERTIONS_SERVICE_ID, METHOD_ASSERT).with_u8(1);
        assert!(matches!(svc.request(&short), Err(RrrError::ShortPayload { .. })));
    }
}
