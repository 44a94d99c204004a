//! Frame codec - CRC16 integrity and RTU length rules.
//!
//! Pure functions over byte slices; no I/O. Transports and the reassembly
//! buffer build on these.

pub mod crc;
pub mod frame;

pub use frame::{decode, encode, expected_len, MAX_FRAME_LEN};
