//! Stream-socket connections (TCP, classic Bluetooth RFCOMM).
//!
//! [`StreamConnection`] is generic over a [`StreamConnector`], the boundary
//! where the physical socket is opened. TCP is provided in-crate by
//! [`TcpConnector`]; classic Bluetooth RFCOMM sockets are created by
//! platform code outside this crate and plug in through the same trait.
//!
//! Reconnecting rebinds the existing transport adapter to the fresh socket
//! instead of recreating it, so timeout/envelope/pacing configuration
//! survives a reconnect.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::WifiEnvelope;
use crate::transport::{StreamTransport, Transport, DEFAULT_OP_TIMEOUT};

/// Boundary for opening the physical stream socket.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn open(&self) -> std::io::Result<Self::Stream>;
}

/// Opens TCP sockets with a bounded connect.
pub struct TcpConnector {
    addr: SocketAddr,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl StreamConnector for TcpConnector {
    type Stream = TcpStream;

    async fn open(&self) -> std::io::Result<TcpStream> {
        match timeout(self.connect_timeout, TcpStream::connect(self.addr)).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            )),
        }
    }
}

/// Master connection over any stream socket.
pub struct StreamConnection<F: StreamConnector> {
    connector: F,
    transport: Option<StreamTransport<F::Stream>>,
    connected: bool,
    read_timeout: Duration,
    envelope: Option<WifiEnvelope>,
    pacing: bool,
}

/// TCP master connection.
pub type TcpConnection = StreamConnection<TcpConnector>;

impl<F: StreamConnector> StreamConnection<F> {
    pub fn new(connector: F) -> Self {
        Self {
            connector,
            transport: None,
            connected: false,
            read_timeout: DEFAULT_OP_TIMEOUT,
            envelope: None,
            pacing: true,
        }
    }

    /// Read timeout applied to the transport. Default 3000 ms.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Wrap frames in the vendor envelope (serial-to-TCP bridges).
    pub fn with_envelope(mut self, envelope: WifiEnvelope) -> Self {
        self.envelope = Some(envelope);
        self
    }

    /// Post-write pacing on the transport. Default on.
    pub fn with_pacing(mut self, pacing: bool) -> Self {
        self.pacing = pacing;
        self
    }
}

#[async_trait]
impl<F: StreamConnector> Connection for StreamConnection<F> {
    type Transport = StreamTransport<F::Stream>;

    async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }
        tracing::debug!("opening stream socket");
        let stream = self
            .connector
            .open()
            .await
            .map_err(|err| Error::Connect(err.to_string()))?;
        match self.transport.as_mut() {
            Some(transport) => transport.rebind(stream),
            None => {
                let mut transport = StreamTransport::new(stream)
                    .with_read_timeout(self.read_timeout)
                    .with_pacing(self.pacing);
                if let Some(envelope) = self.envelope {
                    transport = transport.with_envelope(envelope);
                }
                self.transport = Some(transport);
            }
        }
        self.connected = true;
        tracing::info!("stream socket connected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> Result<()> {
        if self.connected {
            if let Some(transport) = self.transport.as_mut() {
                if let Err(err) = transport.close().await {
                    tracing::debug!(%err, "error closing transport");
                }
            }
            self.connected = false;
            tracing::info!("stream socket closed");
        }
        Ok(())
    }

    fn transport(&mut self) -> Result<&mut Self::Transport> {
        if !self.connected {
            return Err(Error::Io("not connected".into()));
        }
        self.transport
            .as_mut()
            .ok_or_else(|| Error::Io("not connected".into()))
    }
}
