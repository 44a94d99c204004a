//! Reassembly buffer for notification-delivered frames.
//!
//! BLE notifications deliver a response frame in arbitrary chunks (often
//! MTU-sized, sometimes single bytes). This buffer accumulates chunks and
//! applies the function-code length rule after each append to decide when a
//! complete frame is present.
//!
//! Callers must [`reset`](ReassemblyBuffer::reset) before every new
//! exchange so leftover bytes from an abandoned exchange can never leak
//! into the next response.

use crate::codec::{self, MAX_FRAME_LEN};
use crate::error::FrameError;

/// Fixed-size accumulator for one in-flight response frame.
pub struct ReassemblyBuffer {
    buf: [u8; MAX_FRAME_LEN],
    cursor: usize,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self {
            buf: [0; MAX_FRAME_LEN],
            cursor: 0,
        }
    }

    /// Discard all accumulated bytes.
    pub fn reset(&mut self) {
        self.buf.fill(0);
        self.cursor = 0;
    }

    /// Append one notification chunk.
    ///
    /// Returns `Ok(Some(frame))` once the length rule for the buffered
    /// function code is satisfied; the returned frame is exactly the ruled
    /// length. Errors leave the buffer unchanged except that callers are
    /// expected to reset before reusing it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>, FrameError> {
        let end = self.cursor + chunk.len();
        if end > MAX_FRAME_LEN {
            return Err(FrameError::TooLong(end));
        }
        self.buf[self.cursor..end].copy_from_slice(chunk);
        self.cursor = end;

        match codec::expected_len(&self.buf[..self.cursor])? {
            Some(total) if self.cursor >= total => Ok(Some(self.buf[..total].to_vec())),
            _ => Ok(None),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }
}

impl Default for ReassemblyBuffer {
    fn default() -> Self {
        Self::new()
    }
}
