//! Vendor "wifi" envelope for RTU frames carried over TCP bridge modules.
//!
//! Some serial-to-TCP bridges expect every RTU frame, in both directions,
//! to be prefixed with a fixed 9-byte header:
//!
//! ```text
//! ┌──────────────┬─────────┬──────┬──────┬────────────────┐
//! │ "wifi"  (4B) │ tail ip │ 0x01 │ 0x00 │ body len (u16) │
//! │              │  (1B)   │      │      │  big-endian    │
//! └──────────────┴─────────┴──────┴──────┴────────────────┘
//! ```
//!
//! The tail ip byte is the last octet of the bridge's IP address. The body
//! length counts the RTU frame that follows, CRC included.

use crate::codec::MAX_FRAME_LEN;
use crate::error::FrameError;

/// Envelope header size in bytes.
pub const ENVELOPE_LEN: usize = 9;

const MAGIC: [u8; 4] = *b"wifi";
const FILLER: [u8; 2] = [0x01, 0x00];

/// Envelope parameters for one bridge device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiEnvelope {
    tail_ip: u8,
}

impl WifiEnvelope {
    /// Envelope for the bridge whose IP address ends in `tail_ip`.
    pub fn new(tail_ip: u8) -> Self {
        Self { tail_ip }
    }

    #[inline]
    pub fn tail_ip(&self) -> u8 {
        self.tail_ip
    }

    /// Encode the header for a frame of `frame_len` bytes.
    pub fn encode(&self, frame_len: usize) -> [u8; ENVELOPE_LEN] {
        let mut head = [0u8; ENVELOPE_LEN];
        head[..4].copy_from_slice(&MAGIC);
        head[4] = self.tail_ip;
        head[5..7].copy_from_slice(&FILLER);
        head[7..9].copy_from_slice(&(frame_len as u16).to_be_bytes());
        head
    }

    /// Validate an inbound header and return the advertised frame length.
    pub fn parse(head: &[u8; ENVELOPE_LEN]) -> Result<usize, FrameError> {
        if head[..4] != MAGIC {
            return Err(FrameError::BadEnvelope);
        }
        let len = u16::from_be_bytes([head[7], head[8]]) as usize;
        if len < 3 || len > MAX_FRAME_LEN {
            return Err(FrameError::BadEnvelope);
        }
        Ok(len)
    }
}
