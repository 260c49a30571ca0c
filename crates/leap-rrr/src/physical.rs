//! Physical channel: whole messages over a chunk device
//!
//! Writers from several threads are serialised so their chunks never
//! interleave. Reading is meant for one thread at a time (the monitor);
//! the reader lock only keeps a partially reassembled message consistent.

use crate::device::{ChunkDevice, LoopbackDevice};
use crate::error::RrrResult;
use crate::framing::{encode_chunks, Reassembler};
use crate::message::Message;
use leap_core::ktrace;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub trait PhysicalChannel: Send + Sync {
    /// Block until one complete message has arrived
    fn read(&self) -> RrrResult<Message>;

    /// A complete message if one is available now
    fn try_read(&self) -> RrrResult<Option<Message>>;

    fn write(&self, msg: &Message) -> RrrResult<()>;
}

pub struct ChunkedChannel<D> {
    device: D,
    reader: Mutex<Reassembler>,
    writer: Mutex<()>,
    chunks_out: AtomicU64,
    chunks_in: AtomicU64,
}

impl<D: ChunkDevice> ChunkedChannel<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            reader: Mutex::new(Reassembler::new()),
            writer: Mutex::new(()),
            chunks_out: AtomicU64::new(0),
            chunks_in: AtomicU64::new(0),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_out.load(Ordering::Relaxed)
    }

    pub fn chunks_read(&self) -> u64 {
        self.chunks_in.load(Ordering::Relaxed)
    }
}

impl ChunkedChannel<LoopbackDevice> {
    /// Two channels joined back to back
    pub fn loopback_pair() -> (Self, Self) {
        let (a, b) = LoopbackDevice::pair();
        (Self::new(a), Self::new(b))
    }
}

impl<D: ChunkDevice> PhysicalChannel for ChunkedChannel<D> {
    fn read(&self) -> RrrResult<Message> {
        let mut reader = self.reader.lock().unwrap();
        loop {
            let chunk = self.device.read_chunk()?;
            self.chunks_in.fetch_add(1, Ordering::Relaxed);
            if let Some(msg) = reader.push_chunk(&chunk)? {
                return Ok(msg);
            }
        }
    }

    fn try_read(&self) -> RrrResult<Option<Message>> {
        let mut reader = self.reader.lock().unwrap();
        while let Some(chunk) = self.device.try_read_chunk()? {
            self.chunks_in.fetch_add(1, Ordering::Relaxed);
            if let Some(msg) = reader.push_chunk(&chunk)? {
                return Ok(Some(msg));
            }
        }
        Ok(None)
    }

    fn write(&self, msg: &Message) -> RrrResult<()> {
        let chunks = encode_chunks(msg)?;
        let _guard = self.writer.lock().unwrap();
        for chunk in &chunks {
            self.device.write_chunk(chunk)?;
        }
        self.chunks_out.fetch_add(chunks.len() as u64, Ordering::Relaxed);
        ktrace!(
            "rrr write ch={} svc={} mth={} ({} chunks)",
            msg.channel_id, msg.service_id, msg.method_id, chunks.len()
        );
        Ok(())
    }
}
