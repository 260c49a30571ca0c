//! Debug-scan byte sink
//!
//! Scan chains arrive as a byte stream with an end-of-message marker on the
//! last byte. Formatting the result is up to the sink.

use std::sync::Mutex;

pub trait DebugScanSink: Send + Sync {
    fn send(&self, byte: u8, end_of_message: bool);
}

/// Assembles complete scan messages
#[derive(Debug, Default)]
pub struct ScanCollector {
    inner: Mutex<ScanState>,
}

#[derive(Debug, Default)]
struct ScanState {
    partial: Vec<u8>,
    done: Vec<Vec<u8>>,
}

impl ScanCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every completed message, oldest first
    pub fn take_messages(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.inner.lock().unwrap().done)
    }

    /// Bytes received since the last end-of-message
    pub fn pending_bytes(&self) -> usize {
        self.inner.lock().unwrap().partial.len()
    }
}

impl DebugScanSink for ScanCollector {
    fn send(&self, byte: u8, end_of_message: bool) {
        let mut state = self.inner.lock().unwrap();
        state.partial.push(byte);
        if end_of_message {
            let msg = std::mem::take(&mut state.partial);
            state.done.push(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_splits_messages() {
        let c = ScanCollector::new();
        for (i, b) in b"abc".iter().enumerate() {
            c.send(*b, i == 2);
        }
        c.send(b'z', false);
        assert_eq!(c.pending_bytes(), 1);
        assert_eq!(c.take_messages(), vec![b"abc".to_vec()]);
        assert!(c.take_messages().is_empty());
        c.send(b'!', true);
        assert_eq!(c.take_messages(), vec![b"z!".to_vec()]);
    }
}
