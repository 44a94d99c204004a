//! Transport adapters - blocking request/response over heterogeneous
//! channels.
//!
//! Two flavors implement the same [`Transport`] contract:
//!
//! - [`StreamTransport`] drives a byte-stream socket directly (TCP, classic
//!   Bluetooth RFCOMM), reading exact lengths under a timeout.
//! - [`BleTransport`] bridges the callback-driven BLE radio into the same
//!   blocking shape with single-slot completion channels.
//!
//! Every operation is bounded; no call blocks forever on a dead peer.

pub(crate) mod ble;
pub(crate) mod stream;

pub use ble::BleTransport;
pub use stream::StreamTransport;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::protocol::{Request, Response};

/// Default bound for any single transport operation.
pub const DEFAULT_OP_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(3000);

/// One half of a Modbus exchange, as seen by the transaction executor.
///
/// `&mut self` on both operations makes a transport single-exchange by
/// construction; concurrency control lives a level up, in the connection
/// lock held by [`crate::Transaction::execute`].
#[async_trait]
pub trait Transport: Send {
    /// Assemble and transmit one request frame.
    async fn write_message(&mut self, request: &Request) -> Result<()>;

    /// Wait for one complete, length-ruled, CRC-checked response frame.
    async fn read_response(&mut self) -> Result<Response>;

    /// Slave-side reading; these adapters are master-only.
    async fn read_request(&mut self) -> Result<Request> {
        Err(Error::NotSupported("slave-side request reading"))
    }

    /// Release channel resources. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// Space-separated lowercase hex dump, for trace logging.
pub(crate) fn hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
