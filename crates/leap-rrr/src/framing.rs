//! Chunk framing
//!
//! The physical link moves fixed 16-byte chunks. Each chunk starts with a
//! little-endian `u32` header:
//!
//! ```text
//!  31      30                               0
//! +------+----------------------------------+
//! | more |  body bytes remaining (this one  |
//! |      |  included)                       |
//! +------+----------------------------------+
//! ```
//!
//! followed by 12 body bytes. A message body is a 10-byte envelope
//! (channel u8, reserved u8, service u16, method u16, payload length u32)
//! followed by the payload, spread over as many chunks as needed. The
//! unused tail of the last chunk is zero.

use crate::error::{RrrError, RrrResult};
use crate::message::Message;

pub const CHUNK_BYTES: usize = 16;
pub const HEADER_BYTES: usize = 4;
pub const BODY_BYTES: usize = CHUNK_BYTES - HEADER_BYTES;
pub const ENVELOPE_BYTES: usize = 10;

const MORE_FLAG: u32 = 1 << 31;
const REMAINING_MASK: u32 = MORE_FLAG - 1;

pub type Chunk = [u8; CHUNK_BYTES];

/// Split a message into chunks
pub fn encode_chunks(msg: &Message) -> RrrResult<Vec<Chunk>> {
    let body_len = ENVELOPE_BYTES + msg.payload.len();
    if body_len > REMAINING_MASK as usize {
        return Err(RrrError::Framing(format!("message of {} bytes is too large", body_len)));
    }

    let mut body = Vec::with_capacity(body_len);
    body.push(msg.channel_id);
    body.push(0);
    body.extend_from_slice(&msg.service_id.to_le_bytes());
    body.extend_from_slice(&msg.method_id.to_le_bytes());
    body.extend_from_slice(&(msg.payload.len() as u32).to_le_bytes());
    body.extend_from_slice(&msg.payload);

    let mut chunks = Vec::with_capacity(msg.chunk_count());
    for (i, piece) in body.chunks(BODY_BYTES).enumerate() {
        let remaining = (body_len - i * BODY_BYTES) as u32;
        let header = if remaining as usize > BODY_BYTES { remaining | MORE_FLAG } else { remaining };
        let mut chunk = [0u8; CHUNK_BYTES];
        chunk[..HEADER_BYTES].copy_from_slice(&header.to_le_bytes());
        chunk[HEADER_BYTES..HEADER_BYTES + piece.len()].copy_from_slice(piece);
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Rebuilds messages from a chunk stream
#[derive(Debug, Default)]
pub struct Reassembler {
    body: Vec<u8>,
    /// Body bytes still expected, 0 when between messages
    expect: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a message is partially received
    pub fn in_progress(&self) -> bool {
        self.expect != 0
    }

    /// Feed one chunk. Returns the message it completes, if any.
    ///
    /// On a framing error the partial message is discarded so the stream
    /// can resynchronise on the next first chunk.
    pub fn push_chunk(&mut self, chunk: &Chunk) -> RrrResult<Option<Message>> {
        let header = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let more = header & MORE_FLAG != 0;
        let remaining = (header & REMAINING_MASK) as usize;

        if let Err(e) = self.check(remaining, more) {
            self.reset();
            return Err(e);
        }
        if self.expect == 0 {
            self.body.clear();
            self.body.reserve(remaining.min(4096));
        }

        let take = remaining.min(BODY_BYTES);
        self.body.extend_from_slice(&chunk[HEADER_BYTES..HEADER_BYTES + take]);
        self.expect = remaining - take;
        if self.expect > 0 {
            return Ok(None);
        }

        let body = std::mem::take(&mut self.body);
        decode_body(&body).map(Some)
    }

    fn check(&self, remaining: usize, more: bool) -> RrrResult<()> {
        if more != (remaining > BODY_BYTES) {
            return Err(RrrError::Framing(format!(
                "continuation flag {} disagrees with {} bytes remaining",
                more, remaining
            )));
        }
        if self.expect == 0 && remaining < ENVELOPE_BYTES {
            return Err(RrrError::Framing(format!("first chunk announces only {} bytes", remaining)));
        }
        if self.expect != 0 && remaining != self.expect {
            return Err(RrrError::Framing(format!(
                "expected {} bytes remaining, chunk says {}",
                self.expect, remaining
            )));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.body.clear();
        self.expect = 0;
    }
}

fn decode_body(body: &[u8]) -> RrrResult<Message> {
    let len = u32::from_le_bytes([body[6], body[7], body[8], body[9]]) as usize;
    if len != body.len() - ENVELOPE_BYTES {
        return Err(RrrError::Framing(format!(
            "envelope length {} disagrees with {} payload bytes",
            len,
            body.len() - ENVELOPE_BYTES
        )));
    }
    Ok(Message {
        channel_id: body[0],
        service_id: u16::from_le_bytes([body[2], body[3]]),
        method_id: u16::from_le_bytes([body[4], body[5]]),
        payload: body[ENVELOPE_BYTES..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(chunks: &[Chunk]) -> Vec<Message> {
        let mut r = Reassembler::new();
        chunks.iter().filter_map(|c| r.push_chunk(c).unwrap()).collect()
    }

    #[test]
    fn test_single_chunk_layout() {
        let msg = Message::new(1, 0x0203, 0x0405).with_u16(0xBEEF);
        let chunks = encode_chunks(&msg).unwrap();
        assert_eq!(chunks.len(), 1);
        let c = chunks[0];
        // 12 body bytes remaining, no continuation
        assert_eq!(&c[..4], &[12, 0, 0, 0]);
        assert_eq!(&c[4..14], &[1, 0, 0x03, 0x02, 0x05, 0x04, 2, 0, 0, 0]);
        assert_eq!(&c[14..], &[0xEF, 0xBE]);
        assert_eq!(reassemble(&chunks), vec![msg]);
    }

    #[test]
    fn test_multi_chunk_headers() {
        let msg = Message::new(2, 1, 1).with_payload((0..30).collect());
        let chunks = encode_chunks(&msg).unwrap();
        assert_eq!(chunks.len(), msg.chunk_count());
        assert_eq!(chunks.len(), 4);
        let headers: Vec<u32> = chunks
            .iter()
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(headers, vec![40 | MORE_FLAG, 28 | MORE_FLAG, 16 | MORE_FLAG, 4]);
        assert_eq!(reassemble(&chunks), vec![msg]);
    }

    #[test]
    fn test_back_to_back_messages() {
        let a = Message::request(1, 1).with_u64(u64::MAX);
        let b = Message::request(2, 2);
        let mut chunks = encode_chunks(&a).unwrap();
        chunks.extend(encode_chunks(&b).unwrap());
        assert_eq!(reassemble(&chunks), vec![a, b]);
    }

    #[test]
    fn test_out_of_sequence_chunk_is_rejected() {
        let long = encode_chunks(&Message::new(0, 0, 0).with_payload(vec![7; 40])).unwrap();
        let mut r = Reassembler::new();
        assert_eq!(r.push_chunk(&long[0]).unwrap(), None);
        assert!(r.in_progress());
        // Skipping a chunk breaks the remaining-bytes sequence
        assert!(matches!(r.push_chunk(&long[2]), Err(RrrError::Framing(_))));
        assert!(!r.in_progress());

        // Stream recovers on the next message
        let ok = Message::new(3, 3, 3);
        let c = encode_chunks(&ok).unwrap();
        assert_eq!(r.push_chunk(&c[0]).unwrap(), Some(ok));
    }

    #[test]
    fn test_bad_flag_is_rejected() {
        let mut chunk = encode_chunks(&Message::new(0, 0, 0)).unwrap()[0];
        chunk[3] |= 0x80;
        let mut r = Reassembler::new();
        assert!(r.push_chunk(&chunk).is_err());
    }
}
