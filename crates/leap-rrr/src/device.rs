//! Chunk devices
//!
//! The driver contract underneath a physical channel: move whole chunks,
//! nothing else. Real drivers (PCIe, JTAG, DMA) live elsewhere; the
//! loopback device connects two in-process endpoints.

use crate::error::{RrrError, RrrResult};
use crate::framing::Chunk;
use leap_core::BoundedQueue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub trait ChunkDevice: Send + Sync {
    fn write_chunk(&self, chunk: &Chunk) -> RrrResult<()>;

    /// Block until a chunk arrives
    fn read_chunk(&self) -> RrrResult<Chunk>;

    fn try_read_chunk(&self) -> RrrResult<Option<Chunk>>;
}

/// Default loopback FIFO depth in chunks
pub const LOOPBACK_DEPTH: usize = 1024;

const CLOSE_POLL: Duration = Duration::from_millis(5);

/// One end of an in-memory chunk link
pub struct LoopbackDevice {
    rx: Arc<BoundedQueue<Chunk>>,
    tx: Arc<BoundedQueue<Chunk>>,
    closed: Arc<AtomicBool>,
}

impl LoopbackDevice {
    /// Two connected ends: chunks written on one are read on the other
    pub fn pair() -> (LoopbackDevice, LoopbackDevice) {
        Self::pair_with_depth(LOOPBACK_DEPTH)
    }

    pub fn pair_with_depth(depth: usize) -> (LoopbackDevice, LoopbackDevice) {
        let a_to_b = Arc::new(BoundedQueue::new(depth));
        let b_to_a = Arc::new(BoundedQueue::new(depth));
        let closed = Arc::new(AtomicBool::new(false));
        let a = LoopbackDevice {
            rx: Arc::clone(&b_to_a),
            tx: Arc::clone(&a_to_b),
            closed: Arc::clone(&closed),
        };
        let b = LoopbackDevice { rx: a_to_b, tx: b_to_a, closed };
        (a, b)
    }

    /// Tear down the link; blocked readers on both ends return
    /// `Disconnected` once their queue is drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl ChunkDevice for LoopbackDevice {
    fn write_chunk(&self, chunk: &Chunk) -> RrrResult<()> {
        if self.is_closed() {
            return Err(RrrError::Disconnected);
        }
        self.tx.push(*chunk);
        Ok(())
    }

    fn read_chunk(&self) -> RrrResult<Chunk> {
        loop {
            if let Some(chunk) = self.rx.pop_timeout(CLOSE_POLL) {
                return Ok(chunk);
            }
            if self.is_closed() {
                return Err(RrrError::Disconnected);
            }
        }
    }

    fn try_read_chunk(&self) -> RrrResult<Option<Chunk>> {
        match self.rx.try_pop() {
            Some(chunk) => Ok(Some(chunk)),
            None if self.is_closed() => Err(RrrError::Disconnected),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_pair_is_crossed() {
        let (a, b) = LoopbackDevice::pair();
        a.write_chunk(&[1; 16]).unwrap();
        b.write_chunk(&[2; 16]).unwrap();
        assert_eq!(b.read_chunk().unwrap(), [1; 16]);
        assert_eq!(a.try_read_chunk().unwrap(), Some([2; 16]));
        assert_eq!(a.try_read_chunk().unwrap(), None);
    }

    #[test]
    fn test_close_wakes_reader() {
        let (a, b) = LoopbackDevice::pair();
        let reader = thread::spawn(move || b.read_chunk());
        thread::sleep(Duration::from_millis(20));
        a.close();
        assert_eq!(reader.join().unwrap(), Err(RrrError::Disconnected));
        assert_eq!(a.write_chunk(&[0; 16]), Err(RrrError::Disconnected));
    }
}
