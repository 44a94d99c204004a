//! RTU frame assembly and per-function-code length rules.
//!
//! An RTU frame is `[unit id][function code][body...][crc low][crc high]`.
//! The serial line carries no length field, so the total frame length is
//! determined from the function code alone:
//!
//! | function codes | rule |
//! |---|---|
//! | 0x01 0x02 0x03 0x04 0x0C 0x11 0x14 0x15 0x17 | byte count at offset 2, total = count + 5 |
//! | 0x05 0x06 0x0B 0x0F 0x10 0x16 | fixed 8 |
//! | 0x07 0x08 | fixed 3 |
//! | 0x18 | u16 (big-endian) count at offset 2, total = count + 6 |
//! | any code with bit 7 set (exception) | fixed 5 |
//!
//! Anything else is a decode failure, not a guess.

use crate::codec::crc;
use crate::error::FrameError;
use crate::protocol::message::{Request, Response};

/// Largest frame this master accepts (RTU serial line limit).
pub const MAX_FRAME_LEN: usize = 256;

/// Bytes needed before any length rule can be consulted.
const HEADER_LEN: usize = 2;

/// Determine the total frame length from a (possibly partial) buffer.
///
/// Returns `Ok(None)` when more bytes are needed before the length rule for
/// the buffered function code can be applied. Returns an error for function
/// codes outside the table or lengths beyond [`MAX_FRAME_LEN`].
pub fn expected_len(buf: &[u8]) -> Result<Option<usize>, FrameError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let total = match buf[1] {
        0x01 | 0x02 | 0x03 | 0x04 | 0x0C | 0x11 | 0x14 | 0x15 | 0x17 => match buf.get(2) {
            Some(&count) => count as usize + 5,
            None => return Ok(None),
        },
        0x05 | 0x06 | 0x0B | 0x0F | 0x10 | 0x16 => 8,
        // Serial-line diagnostics; too short to carry a CRC at all.
        0x07 | 0x08 => 3,
        0x18 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            u16::from_be_bytes([buf[2], buf[3]]) as usize + 6
        }
        code if code & 0x80 != 0 => 5,
        code => return Err(FrameError::UnknownFunction(code)),
    };
    if total > MAX_FRAME_LEN {
        return Err(FrameError::TooLong(total));
    }
    Ok(Some(total))
}

/// Assemble the complete wire frame for a request: headless PDU plus CRC.
pub fn encode(request: &Request) -> Vec<u8> {
    let mut frame = request.encode();
    let crc = crc::crc16_bytes(&frame);
    frame.extend_from_slice(&crc);
    frame
}

/// Decode a complete frame into a response: length rule, CRC, then split.
///
/// Frames for function codes 0x07/0x08 are only 3 bytes and carry no CRC;
/// they decode without an integrity check, matching the length table.
pub fn decode(frame: &[u8]) -> Result<Response, FrameError> {
    let total = expected_len(frame)?.ok_or(FrameError::Truncated {
        expected: HEADER_LEN + 1,
        actual: frame.len(),
    })?;
    if frame.len() < total {
        return Err(FrameError::Truncated {
            expected: total,
            actual: frame.len(),
        });
    }
    let frame = &frame[..total];
    let body_end = if frame.len() >= 4 {
        crc::verify(frame)?;
        frame.len() - 2
    } else {
        frame.len()
    };
    Ok(Response::new(frame[0], frame[1], frame[2..body_end].to_vec()))
}
