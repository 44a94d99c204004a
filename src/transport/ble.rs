//! BLE transport - sync-over-async bridge for a callback-driven radio.
//!
//! There is no blocking read at the radio layer: writes complete and
//! response bytes arrive as uncorrelated events on the radio's callback
//! context. This adapter converts that into the blocking [`Transport`]
//! contract with one single-slot completion channel per pending operation:
//!
//! ```text
//!  write_message()                         event dispatcher
//!  ───────────────                         ────────────────
//!  reset reassembly                          WriteComplete ──► fire ack slot
//!  arm ack + frame slots                     Notification  ──► reassemble,
//!  send Write command ──► radio actor                          fire frame slot
//!  await ack slot (bounded)                                     when complete
//!
//!  read_response()
//!  ───────────────
//!  await frame slot (bounded), decode
//! ```
//!
//! Both slots are armed before the radio sees the data, so a peer that
//! notifies before we start waiting loses nothing. The reassembly buffer is
//! reset on every write; stale bytes from an abandoned exchange cannot leak
//! into the next response.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;

use crate::codec;
use crate::connection::ble::RadioCommand;
use crate::error::{Error, Result};
use crate::protocol::{ReassemblyBuffer, Request, Response};
use crate::transport::{hex, Transport, DEFAULT_OP_TIMEOUT};

/// Completion slots armed by the transport and fired by the connection's
/// event dispatcher. One of each, matching the one-exchange-in-flight
/// discipline.
pub(crate) struct LinkSlots {
    pub(crate) write_ack: Option<oneshot::Sender<bool>>,
    pub(crate) frame: Option<oneshot::Sender<Vec<u8>>>,
    pub(crate) reassembly: ReassemblyBuffer,
}

impl LinkSlots {
    pub(crate) fn new() -> Self {
        Self {
            write_ack: None,
            frame: None,
            reassembly: ReassemblyBuffer::new(),
        }
    }
}

/// Master transport over a BLE GATT write/notify characteristic pair.
pub struct BleTransport {
    commands: mpsc::Sender<RadioCommand>,
    slots: Arc<Mutex<LinkSlots>>,
    pending_frame: Option<oneshot::Receiver<Vec<u8>>>,
    op_timeout: Duration,
}

impl BleTransport {
    pub(crate) fn new(commands: mpsc::Sender<RadioCommand>, slots: Arc<Mutex<LinkSlots>>) -> Self {
        Self {
            commands,
            slots,
            pending_frame: None,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Bound for the write acknowledgement and for frame completion.
    /// Default 3000 ms.
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn write_message(&mut self, request: &Request) -> Result<()> {
        let frame = codec::encode(request);
        tracing::trace!(frame = %hex(&frame), "writing frame to radio");

        let (ack_tx, ack_rx) = oneshot::channel();
        let (frame_tx, frame_rx) = oneshot::channel();
        {
            let mut slots = self.slots.lock().await;
            slots.reassembly.reset();
            slots.write_ack = Some(ack_tx);
            slots.frame = Some(frame_tx);
        }
        self.pending_frame = Some(frame_rx);

        self.commands
            .send(RadioCommand::Write {
                data: Bytes::from(frame),
            })
            .await
            .map_err(|_| Error::Io("radio context gone".into()))?;

        match timeout(self.op_timeout, ack_rx).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(Error::Io("characteristic write failed".into())),
            Ok(Err(_)) => Err(Error::Io("write acknowledgement lost".into())),
            Err(_) => Err(Error::Io("write timed out".into())),
        }
    }

    async fn read_response(&mut self) -> Result<Response> {
        let frame_rx = self
            .pending_frame
            .take()
            .ok_or_else(|| Error::Io("no exchange in flight".into()))?;

        let frame = match timeout(self.op_timeout, frame_rx).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(_)) => return Err(Error::Io("notification channel closed".into())),
            Err(_) => return Err(Error::Io("read timed out".into())),
        };
        tracing::trace!(frame = %hex(&frame), "frame received from radio");
        Ok(codec::decode(&frame)?)
    }

    async fn close(&mut self) -> Result<()> {
        let mut slots = self.slots.lock().await;
        slots.write_ack = None;
        slots.frame = None;
        slots.reassembly.reset();
        self.pending_frame = None;
        Ok(())
    }
}
