//! CRC16/MODBUS checksum.
//!
//! Initial value `0xFFFF`, reflected polynomial `0xA001`, input processed
//! LSB-first. On the wire the low CRC byte is transmitted before the high
//! byte.

use crate::error::FrameError;

const POLY: u16 = 0xA001;

static CRC_TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the CRC16/MODBUS of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for &byte in data {
        let idx = ((crc ^ byte as u16) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC_TABLE[idx];
    }
    crc
}

/// CRC of `data` in wire order: low byte first, high byte second.
pub fn crc16_bytes(data: &[u8]) -> [u8; 2] {
    let crc = crc16(data);
    [(crc & 0xFF) as u8, (crc >> 8) as u8]
}

/// Verify the trailing two-byte CRC of a complete frame.
///
/// Requires at least 4 bytes (unit id, function code, CRC); shorter frames
/// have no room for a checksum and must not reach this function.
pub fn verify(frame: &[u8]) -> Result<(), FrameError> {
    if frame.len() < 4 {
        return Err(FrameError::Truncated {
            expected: 4,
            actual: frame.len(),
        });
    }
    let split = frame.len() - 2;
    let expected = crc16(&frame[..split]);
    let actual = u16::from_le_bytes([frame[split], frame[split + 1]]);
    if expected != actual {
        return Err(FrameError::Crc { expected, actual });
    }
    Ok(())
}
