//! Connection lifecycle for the master transports.
//!
//! A connection owns the physical channel and the transport adapter bound
//! to it. Reconnecting may rebind the adapter, so callers must re-fetch
//! [`Connection::transport`] after every `connect()`.

pub mod ble;
pub mod stream;

pub use ble::{BleConnection, BleRadio, RadioCommand, RadioEvent};
pub use stream::{StreamConnection, StreamConnector, TcpConnection, TcpConnector};

use async_trait::async_trait;

use crate::error::Result;
use crate::transport::Transport;

/// Lifecycle state of the underlying channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Channel lifecycle, as seen by the transaction executor.
#[async_trait]
pub trait Connection: Send {
    type Transport: Transport;

    /// Open the physical channel. No-op when already connected.
    async fn connect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Release the channel. Safe to call when already closed.
    async fn close(&mut self) -> Result<()>;

    /// The live transport adapter. Only valid while connected; must be
    /// re-fetched after any (re)connect.
    fn transport(&mut self) -> Result<&mut Self::Transport>;
}
