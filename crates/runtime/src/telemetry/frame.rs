//! Demultiplexer for the engine's attach/logs wire format.
//!
//! Without a TTY the engine frames stdout/stderr as
//! `[1 B stream-type][3 B pad][4 B big-endian payload length][payload]`.
//! Frames arrive split across arbitrary read boundaries; a frame is only
//! decoded once all `8 + len` bytes are buffered.

use bytes::{Buf, Bytes, BytesMut};

const HEADER_LEN: usize = 8;

#[derive(Debug, Default)]
pub struct FrameParser {
    buf: BytesMut,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one read's worth of bytes and peel every frame that is now
    /// complete, in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }
            let payload_len = u32::from_be_bytes([
                self.buf[4],
                self.buf[5],
                self.buf[6],
                self.buf[7],
            ]) as usize;
            if self.buf.len() < HEADER_LEN + payload_len {
                break;
            }
            self.buf.advance(HEADER_LEN);
            payloads.push(self.buf.split_to(payload_len).freeze());
        }
        payloads
    }

    /// Bytes buffered but not yet decodable into a full frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Accumulates raw (TTY) bytes and yields complete `\n`-terminated lines.
/// The remainder is held until the next feed or `finish`.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let rest = self.buf.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.buf, rest);
            line.pop(); // trailing \n
            lines.push(Bytes::from(line));
        }
        lines
    }

    /// Flush whatever is left once the source has ended.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(Bytes::from(std::mem::take(&mut self.buf)))
        }
    }
}
