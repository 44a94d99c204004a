//! BLE master connection.
//!
//! Platform BLE stacks require every radio operation to run on one
//! privileged context, and they report results through callbacks on that
//! context. The same shape here: a single actor (the [`BleRadio`]
//! implementation, supplied by platform glue) owns the radio and is talked
//! to exclusively through [`RadioCommand`] messages; everything it observes
//! comes back as [`RadioEvent`]s.
//!
//! ```text
//!   BleConnection ──RadioCommand──► radio actor (platform glue)
//!        ▲                              │
//!        │        dispatcher ◄──RadioEvent
//!        │            │
//!   state/services    └─► completion slots (write ack, frame)
//!      watches
//! ```
//!
//! `connect()` is a bounded two-stage wait: first for the link to come up,
//! then for both GATT characteristics (write, notify) to resolve. A link
//! without both characteristics is useless and fails fast, naming the
//! missing one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::connection::{Connection, LinkState};
use crate::error::{Error, Result};
use crate::transport::ble::{BleTransport, LinkSlots};
use crate::transport::DEFAULT_OP_TIMEOUT;

/// Commands executed on the privileged radio context.
#[derive(Debug)]
pub enum RadioCommand {
    /// Bring the link up and discover GATT services.
    Connect,
    /// Write `data` to the write characteristic.
    Write { data: Bytes },
    /// Tear the link down.
    Close,
}

/// Events raised by the radio stack's callback context.
#[derive(Debug)]
pub enum RadioEvent {
    LinkState(LinkState),
    /// Service discovery finished; reports which of the two required
    /// characteristics were found.
    ServicesResolved { write: bool, notify: bool },
    /// A characteristic write finished, successfully or not.
    WriteComplete(bool),
    /// Bytes arrived on the notify characteristic.
    Notification(Bytes),
}

/// The radio boundary, implemented outside this crate by platform glue.
///
/// `run` owns the radio for its whole lifetime: it consumes commands until
/// the channel closes and pushes everything it observes into `events`. All
/// radio calls happen inside this one task.
#[async_trait]
pub trait BleRadio: Send + 'static {
    async fn run(
        self,
        commands: mpsc::Receiver<RadioCommand>,
        events: mpsc::UnboundedSender<RadioEvent>,
    );
}

/// Master connection over a BLE radio.
pub struct BleConnection {
    commands: mpsc::Sender<RadioCommand>,
    state_rx: watch::Receiver<LinkState>,
    services_rx: watch::Receiver<Option<(bool, bool)>>,
    slots: Arc<Mutex<LinkSlots>>,
    transport: Option<BleTransport>,
    connect_timeout: Duration,
    op_timeout: Duration,
    _dispatcher: JoinHandle<()>,
}

impl BleConnection {
    /// Spawn `radio` and the event dispatcher, returning a connection that
    /// is not yet connected.
    pub fn new<R: BleRadio>(radio: R) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        let (services_tx, services_rx) = watch::channel(None);
        let slots = Arc::new(Mutex::new(LinkSlots::new()));

        tokio::spawn(radio.run(cmd_rx, event_tx));
        let dispatcher = tokio::spawn(dispatch_events(
            event_rx,
            state_tx,
            services_tx,
            Arc::clone(&slots),
        ));

        Self {
            commands: cmd_tx,
            state_rx,
            services_rx,
            slots,
            transport: None,
            connect_timeout: DEFAULT_OP_TIMEOUT,
            op_timeout: DEFAULT_OP_TIMEOUT,
            _dispatcher: dispatcher,
        }
    }

    /// Bound for each connect stage (link up, services resolved).
    /// Default 3000 ms.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Bound for each transport operation. Default 3000 ms.
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }
}

#[async_trait]
impl Connection for BleConnection {
    type Transport = BleTransport;

    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        tracing::debug!("requesting BLE link");
        self.commands
            .send(RadioCommand::Connect)
            .await
            .map_err(|_| Error::Connect("radio context gone".into()))?;

        let up = wait_for(&mut self.state_rx, self.connect_timeout, |state| {
            *state == LinkState::Connected
        })
        .await;
        if !up {
            return Err(Error::Connect("BLE link did not come up".into()));
        }

        let resolved = wait_for(&mut self.services_rx, self.connect_timeout, |services| {
            services.is_some()
        })
        .await;
        if !resolved {
            return Err(Error::Connect("GATT services were not resolved".into()));
        }
        match *self.services_rx.borrow() {
            Some((true, true)) => {}
            Some((false, _)) => {
                return Err(Error::Connect("write characteristic missing".into()));
            }
            Some((_, false)) => {
                return Err(Error::Connect("notify characteristic missing".into()));
            }
            None => {
                return Err(Error::Connect("GATT services were not resolved".into()));
            }
        }

        if self.transport.is_none() {
            self.transport = Some(
                BleTransport::new(self.commands.clone(), Arc::clone(&self.slots))
                    .with_op_timeout(self.op_timeout),
            );
        }
        tracing::info!("BLE link connected, characteristics resolved");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.state_rx.borrow() == LinkState::Connected
    }

    async fn close(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        if self.commands.send(RadioCommand::Close).await.is_err() {
            tracing::warn!("radio context gone during close");
            return Ok(());
        }
        let down = wait_for(&mut self.state_rx, self.connect_timeout, |state| {
            *state == LinkState::Disconnected
        })
        .await;
        if !down {
            tracing::warn!("radio did not confirm disconnect in time");
        }
        tracing::info!("BLE link closed");
        Ok(())
    }

    fn transport(&mut self) -> Result<&mut Self::Transport> {
        if !self.is_connected() {
            return Err(Error::Io("not connected".into()));
        }
        self.transport
            .as_mut()
            .ok_or_else(|| Error::Io("not connected".into()))
    }
}

/// Wait until `ready` holds for the watched value, bounded by `bound`.
async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, bound: Duration, mut ready: F) -> bool
where
    F: FnMut(&T) -> bool,
{
    let deadline = tokio::time::Instant::now() + bound;
    loop {
        if ready(&rx.borrow_and_update()) {
            return true;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return false;
        }
        match timeout(deadline - now, rx.changed()).await {
            Ok(Ok(())) => {}
            // Sender gone or deadline hit; one final look.
            Ok(Err(_)) | Err(_) => return ready(&rx.borrow()),
        }
    }
}

/// Route radio events to the state watches and the completion slots.
async fn dispatch_events(
    mut events: mpsc::UnboundedReceiver<RadioEvent>,
    state_tx: watch::Sender<LinkState>,
    services_tx: watch::Sender<Option<(bool, bool)>>,
    slots: Arc<Mutex<LinkSlots>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RadioEvent::LinkState(state) => {
                tracing::debug!(?state, "link state changed");
                if state == LinkState::Disconnected {
                    let _ = services_tx.send(None);
                }
                let _ = state_tx.send(state);
            }
            RadioEvent::ServicesResolved { write, notify } => {
                tracing::debug!(write, notify, "GATT services resolved");
                let _ = services_tx.send(Some((write, notify)));
            }
            RadioEvent::WriteComplete(ok) => {
                let mut slots = slots.lock().await;
                match slots.write_ack.take() {
                    Some(ack) => {
                        let _ = ack.send(ok);
                    }
                    None => tracing::warn!("unsolicited write completion"),
                }
            }
            RadioEvent::Notification(data) => {
                let mut slots = slots.lock().await;
                match slots.reassembly.push(&data) {
                    Ok(Some(frame)) => match slots.frame.take() {
                        Some(tx) => {
                            let _ = tx.send(frame);
                        }
                        None => tracing::warn!("complete frame with no pending reader"),
                    },
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(%err, "dropping notification bytes");
                        slots.reassembly.reset();
                    }
                }
            }
        }
    }
}
