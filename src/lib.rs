//! # rtulink
//!
//! Modbus RTU master over three kinds of channel: BLE (GATT write/notify),
//! classic Bluetooth (RFCOMM stream) and TCP, optionally wrapped in the
//! vendor "wifi" envelope used by serial-to-TCP bridge modules.
//!
//! ## Architecture
//!
//! ```text
//! Transaction ──lock──► Connection ──► Transport ──► bytes
//!                       (lifecycle)    (one exchange)
//!                                          │
//!                              codec (CRC16 + length rules)
//! ```
//!
//! - [`codec`] - CRC16/MODBUS, per-function-code length rules, frame
//!   assembly and validation. Pure functions, no I/O.
//! - [`protocol`] - request/response messages, the BLE reassembly buffer,
//!   the vendor TCP envelope.
//! - [`transport`] - the blocking write/read contract, as a direct socket
//!   adapter and as a sync-over-async bridge for the callback-driven BLE
//!   radio.
//! - [`connection`] - channel lifecycle and adapter (re)binding.
//! - [`Transaction`] - one serialized request/response exchange per call,
//!   with slave-exception mapping, optional retry, reconnect-per-call and
//!   validity checking.
//!
//! Every blocking point is bounded (3000 ms by default); no call waits
//! forever on a dead peer.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//! use rtulink::{Request, StreamConnection, TcpConnector, Transaction};
//!
//! #[tokio::main]
//! async fn main() -> rtulink::Result<()> {
//!     let addr = "192.168.16.254:8899".parse().expect("address");
//!     let connection = Arc::new(Mutex::new(StreamConnection::new(TcpConnector::new(addr))));
//!
//!     let mut transaction = Transaction::new(connection);
//!     transaction.set_request(Request::read_holding_registers(1, 0x0000, 10));
//!     transaction.execute().await?;
//!
//!     println!("{:?}", transaction.response());
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod transport;

mod transaction;

pub use connection::{
    BleConnection, BleRadio, Connection, LinkState, RadioCommand, RadioEvent, StreamConnection,
    StreamConnector, TcpConnection, TcpConnector,
};
pub use error::{Error, FrameError, Result};
pub use protocol::{ReassemblyBuffer, Request, Response, WifiEnvelope};
pub use transaction::Transaction;
pub use transport::{BleTransport, StreamTransport, Transport};
