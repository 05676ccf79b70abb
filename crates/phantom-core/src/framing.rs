//! Length-prefixed frame codec for the encrypted TCP stream.
//!
//! Outbound messages are prefixed with a 2-byte big-endian length.
//! Inbound bytes arrive in arbitrary chunks; the stateful decoder
//! reassembles exactly one message per completed frame and immediately
//! re-enters leftover bytes from the same chunk, so a single `push` can
//! emit any number of frames. The 2-byte header itself may arrive split
//! across chunks.

use crate::error::FrameError;
use crate::MAX_FRAME_LEN;

/// Prepend the 2-byte big-endian length to a message.
pub fn encode_frame(msg: &[u8]) -> Result<Vec<u8>, FrameError> {
    if msg.len() > MAX_FRAME_LEN {
        return Err(FrameError::Oversized { len: msg.len() });
    }

    let mut out = Vec::with_capacity(msg.len() + 2);
    out.push((msg.len() >> 8) as u8);
    out.push((msg.len() & 0xFF) as u8);
    out.extend_from_slice(msg);
    Ok(out)
}

/// Stateful inbound frame reassembler.
///
/// Chunk-driven: no byte is ever dropped. Every byte either completes
/// the current frame, starts the next header, or waits as a pending
/// header byte.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// First header byte when the header arrived split
    pending_header: Option<u8>,
    /// Expected length of the frame in progress
    expected: Option<usize>,
    /// Bytes collected for the frame in progress
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create a decoder awaiting its first header
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of stream bytes; returns every frame it completes,
    /// in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut rest = chunk;

        while !rest.is_empty() {
            match self.expected {
                None => {
                    let len = if let Some(hi) = self.pending_header.take() {
                        let lo = rest[0];
                        rest = &rest[1..];
                        usize::from(hi) << 8 | usize::from(lo)
                    } else if rest.len() == 1 {
                        self.pending_header = Some(rest[0]);
                        return frames;
                    } else {
                        let len = usize::from(rest[0]) << 8 | usize::from(rest[1]);
                        rest = &rest[2..];
                        len
                    };

                    if len == 0 {
                        // Zero-length frames are legal and complete at once
                        frames.push(Vec::new());
                    } else {
                        self.expected = Some(len);
                        self.buffer = Vec::with_capacity(len);
                    }
                }
                Some(len) => {
                    let take = (len - self.buffer.len()).min(rest.len());
                    self.buffer.extend_from_slice(&rest[..take]);
                    rest = &rest[take..];

                    if self.buffer.len() == len {
                        frames.push(std::mem::take(&mut self.buffer));
                        self.expected = None;
                    }
                }
            }
        }

        frames
    }

    /// Whether a frame or header is partially collected
    #[must_use]
    pub fn mid_frame(&self) -> bool {
        self.expected.is_some() || self.pending_header.is_some()
    }
}
