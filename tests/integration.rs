//! End-to-end tests: a scripted slave on the far end of an in-memory
//! stream, driven through the public API only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, Mutex};

use rtulink::codec;
use rtulink::{
    BleConnection, BleRadio, Connection, Error, LinkState, RadioCommand, RadioEvent, Request,
    StreamConnection, StreamConnector, Transaction, WifiEnvelope,
};

/// Hands out pre-created in-memory streams, one per connect.
struct ScriptedConnector {
    streams: std::sync::Mutex<Vec<DuplexStream>>,
}

impl ScriptedConnector {
    fn single(stream: DuplexStream) -> Self {
        Self {
            streams: std::sync::Mutex::new(vec![stream]),
        }
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    type Stream = DuplexStream;

    async fn open(&self) -> std::io::Result<DuplexStream> {
        self.streams.lock().unwrap().pop().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "no more sockets")
        })
    }
}

/// All master read/write requests used here are fixed 8-byte frames.
async fn read_request_frame(stream: &mut DuplexStream) -> Vec<u8> {
    let mut frame = vec![0u8; 8];
    stream.read_exact(&mut frame).await.unwrap();
    assert!(codec::crc::verify(&frame).is_ok(), "request CRC");
    frame
}

fn holding_response(unit_id: u8, values: &[u16]) -> Vec<u8> {
    let mut frame = vec![unit_id, 0x03, (values.len() * 2) as u8];
    for value in values {
        frame.extend_from_slice(&value.to_be_bytes());
    }
    let crc = codec::crc::crc16_bytes(&frame);
    frame.extend_from_slice(&crc);
    frame
}

fn exception_response(unit_id: u8, function: u8, code: u8) -> Vec<u8> {
    let mut frame = vec![unit_id, function | 0x80, code];
    let crc = codec::crc::crc16_bytes(&frame);
    frame.extend_from_slice(&crc);
    frame
}

fn connection(
    stream: DuplexStream,
) -> Arc<Mutex<StreamConnection<ScriptedConnector>>> {
    Arc::new(Mutex::new(
        StreamConnection::new(ScriptedConnector::single(stream))
            .with_read_timeout(Duration::from_millis(200))
            .with_pacing(false),
    ))
}

#[tokio::test]
async fn read_holding_registers_end_to_end() {
    let (master, mut slave) = duplex(1024);

    let slave_task = tokio::spawn(async move {
        let request = read_request_frame(&mut slave).await;
        assert_eq!(&request[..6], &[0x01, 0x03, 0x00, 0x10, 0x00, 0x02]);
        slave
            .write_all(&holding_response(0x01, &[0x002A, 0x0100]))
            .await
            .unwrap();
        slave
    });

    let mut transaction = Transaction::with_request(
        connection(master),
        Request::read_holding_registers(0x01, 0x0010, 2),
    );
    transaction.execute().await.unwrap();

    let response = transaction.response().unwrap();
    assert_eq!(response.unit_id(), 0x01);
    assert_eq!(response.function(), 0x03);
    assert_eq!(response.data(), &[0x04, 0x00, 0x2A, 0x01, 0x00]);
    slave_task.await.unwrap();
}

#[tokio::test]
async fn concurrent_transactions_are_serialized() {
    let (master, mut slave) = duplex(1024);

    // The slave answers strictly one well-formed frame at a time; any
    // interleaved writes from the master side would corrupt a frame and
    // fail the CRC assertion inside read_request_frame.
    let slave_task = tokio::spawn(async move {
        for _ in 0..8 {
            let request = read_request_frame(&mut slave).await;
            let unit_id = request[0];
            slave
                .write_all(&holding_response(unit_id, &[unit_id as u16]))
                .await
                .unwrap();
        }
        slave
    });

    let shared = connection(master);
    let mut tasks = Vec::new();
    for unit_id in [0x01u8, 0x02u8] {
        let shared = Arc::clone(&shared);
        tasks.push(tokio::spawn(async move {
            let mut transaction = Transaction::new(shared);
            transaction.set_checking_validity(true);
            for _ in 0..4 {
                transaction.set_request(Request::read_holding_registers(unit_id, 0x0000, 1));
                transaction.execute().await.unwrap();
                let response = transaction.response().unwrap();
                assert_eq!(response.unit_id(), unit_id);
                assert_eq!(response.data(), &[0x02, 0x00, unit_id]);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    slave_task.await.unwrap();
}

#[tokio::test]
async fn timeout_leaves_connection_usable() {
    let (master, mut slave) = duplex(1024);

    let slave_task = tokio::spawn(async move {
        // Swallow the first request, answer the second.
        let _ = read_request_frame(&mut slave).await;
        let request = read_request_frame(&mut slave).await;
        slave
            .write_all(&holding_response(request[0], &[7]))
            .await
            .unwrap();
        slave
    });

    let shared = connection(master);
    let mut transaction = Transaction::with_request(
        Arc::clone(&shared),
        Request::read_holding_registers(0x01, 0x0000, 1),
    );

    let err = transaction.execute().await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    // A timeout is not a disconnect; the caller decides what happens next.
    assert!(shared.lock().await.is_connected());

    transaction.execute().await.unwrap();
    assert_eq!(transaction.response().unwrap().data(), &[0x02, 0x00, 0x07]);
    slave_task.await.unwrap();
}

#[tokio::test]
async fn slave_exception_surfaces_with_response() {
    let (master, mut slave) = duplex(1024);

    let slave_task = tokio::spawn(async move {
        let request = read_request_frame(&mut slave).await;
        slave
            .write_all(&exception_response(request[0], request[1], 0x02))
            .await
            .unwrap();
        slave
    });

    let mut transaction = Transaction::with_request(
        connection(master),
        Request::read_holding_registers(0x01, 0xFFFF, 1),
    );

    let err = transaction.execute().await.unwrap_err();
    assert!(matches!(err, Error::Slave(0x02)));
    let response = transaction.response().unwrap();
    assert!(response.is_exception());
    assert_eq!(response.exception_code(), Some(0x02));
    slave_task.await.unwrap();
}

#[tokio::test]
async fn enveloped_exchange_end_to_end() {
    let (master, mut slave) = duplex(1024);

    let slave_task = tokio::spawn(async move {
        let mut head = [0u8; 9];
        slave.read_exact(&mut head).await.unwrap();
        assert_eq!(&head[..4], b"wifi");
        assert_eq!(head[4], 254);
        let frame_len = WifiEnvelope::parse(&head).unwrap();
        assert_eq!(frame_len, 8);
        let mut request = vec![0u8; frame_len];
        slave.read_exact(&mut request).await.unwrap();
        assert!(codec::crc::verify(&request).is_ok());

        let response = holding_response(request[0], &[0x1234]);
        let head = WifiEnvelope::new(254).encode(response.len());
        slave.write_all(&head).await.unwrap();
        slave.write_all(&response).await.unwrap();
        slave
    });

    let shared = Arc::new(Mutex::new(
        StreamConnection::new(ScriptedConnector::single(master))
            .with_read_timeout(Duration::from_millis(200))
            .with_pacing(false)
            .with_envelope(WifiEnvelope::new(254)),
    ));
    let mut transaction = Transaction::with_request(
        shared,
        Request::read_holding_registers(0x01, 0x0000, 1),
    );
    transaction.execute().await.unwrap();
    assert_eq!(transaction.response().unwrap().data(), &[0x02, 0x12, 0x34]);
    slave_task.await.unwrap();
}

/// Radio that echoes a canned register response, delivered one byte per
/// notification, to prove reassembly across chunk boundaries.
struct EchoRadio;

#[async_trait]
impl BleRadio for EchoRadio {
    async fn run(
        self,
        mut commands: mpsc::Receiver<RadioCommand>,
        events: mpsc::UnboundedSender<RadioEvent>,
    ) {
        while let Some(command) = commands.recv().await {
            match command {
                RadioCommand::Connect => {
                    let _ = events.send(RadioEvent::LinkState(LinkState::Connected));
                    let _ = events.send(RadioEvent::ServicesResolved {
                        write: true,
                        notify: true,
                    });
                }
                RadioCommand::Write { data } => {
                    assert!(codec::crc::verify(&data).is_ok());
                    let _ = events.send(RadioEvent::WriteComplete(true));
                    for byte in holding_response(data[0], &[0x0042]) {
                        let _ = events.send(RadioEvent::Notification(Bytes::copy_from_slice(&[
                            byte,
                        ])));
                    }
                }
                RadioCommand::Close => {
                    let _ = events.send(RadioEvent::LinkState(LinkState::Disconnected));
                }
            }
        }
    }
}

#[tokio::test]
async fn ble_exchange_reassembles_single_byte_notifications() {
    let shared = Arc::new(Mutex::new(
        BleConnection::new(EchoRadio).with_connect_timeout(Duration::from_millis(200)),
    ));
    let mut transaction = Transaction::with_request(
        Arc::clone(&shared),
        Request::read_holding_registers(0x01, 0x0000, 1),
    );

    transaction.execute().await.unwrap();
    let response = transaction.response().unwrap();
    assert_eq!(response.unit_id(), 0x01);
    assert_eq!(response.data(), &[0x02, 0x00, 0x42]);

    shared.lock().await.close().await.unwrap();
    assert!(!shared.lock().await.is_connected());
}
