//! RRR message envelope
//!
//! A message is addressed by a channel id (which stream on the physical
//! link it belongs to) plus a service and method id, and carries an opaque
//! little-endian payload.

use crate::error::{RrrError, RrrResult};
use crate::framing::{BODY_BYTES, ENVELOPE_BYTES};

/// Requests addressed to services on the receiving side
pub const CHANNEL_SERVER: u8 = 0;
/// Responses to requests the receiving side issued
pub const CHANNEL_CLIENT: u8 = 1;
/// Flow-controlled channel data
pub const CHANNEL_LI_DATA: u8 = 2;
/// Flow-control credit returns
pub const CHANNEL_LI_CREDIT: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub channel_id: u8,
    pub service_id: u16,
    pub method_id: u16,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(channel_id: u8, service_id: u16, method_id: u16) -> Self {
        Self { channel_id, service_id, method_id, payload: Vec::new() }
    }

    /// Request for `service`/`method` on the peer
    pub fn request(service_id: u16, method_id: u16) -> Self {
        Self::new(CHANNEL_SERVER, service_id, method_id)
    }

    /// Response to `req`, addressed back to the requesting client
    pub fn response_to(req: &Message, payload: Vec<u8>) -> Self {
        Self {
            channel_id: CHANNEL_CLIENT,
            service_id: req.service_id,
            method_id: req.method_id,
            payload,
        }
    }

    /// `(service_id, method_id)`: what a response is matched on
    #[inline]
    pub fn key(&self) -> (u16, u16) {
        (self.service_id, self.method_id)
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_u8(mut self, v: u8) -> Self {
        self.payload.push(v);
        self
    }

    pub fn with_u16(mut self, v: u16) -> Self {
        self.payload.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn with_u32(mut self, v: u32) -> Self {
        self.payload.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn with_u64(mut self, v: u64) -> Self {
        self.payload.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn reader(&self) -> PayloadReader<'_> {
        PayloadReader { buf: &self.payload, pos: 0 }
    }

    /// Chunks this message occupies on the physical link
    pub fn chunk_count(&self) -> usize {
        chunks_for_payload(self.payload.len())
    }
}

/// Chunks needed for a message with `payload_len` payload bytes
pub fn chunks_for_payload(payload_len: usize) -> usize {
    (ENVELOPE_BYTES + payload_len).div_ceil(BODY_BYTES)
}

/// Sequential little-endian decoder over a payload
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn take(&mut self, n: usize) -> RrrResult<&'a [u8]> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(RrrError::ShortPayload { needed: n, remaining });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> RrrResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> RrrResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> RrrResult<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> RrrResult<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> RrrResult<u64> {
        self.array().map(u64::from_le_bytes)
    }

    /// Everything not read yet
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
