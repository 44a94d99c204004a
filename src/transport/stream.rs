//! Stream-socket transport (TCP, classic Bluetooth RFCOMM).
//!
//! Frames are read in stages: two header bytes, then one byte at a time
//! until the function-code length rule resolves, then the remainder in one
//! exact read. Every stage runs under the read timeout.
//!
//! After a failed read the input side is drained so a desynchronized or
//! half-delivered frame cannot corrupt the next exchange.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::codec;
use crate::error::{Error, Result};
use crate::protocol::envelope::{WifiEnvelope, ENVELOPE_LEN};
use crate::protocol::{Request, Response};
use crate::transport::{hex, Transport, DEFAULT_OP_TIMEOUT};

/// How long to wait for further stale bytes while draining.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Master transport over any async byte stream.
pub struct StreamTransport<S> {
    stream: S,
    read_timeout: Duration,
    envelope: Option<WifiEnvelope>,
    pacing: bool,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_timeout: DEFAULT_OP_TIMEOUT,
            envelope: None,
            pacing: true,
        }
    }

    /// Bound for each read stage. Default 3000 ms.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Wrap every outbound frame, and expect every inbound frame to be
    /// wrapped, in the vendor envelope.
    pub fn with_envelope(mut self, envelope: WifiEnvelope) -> Self {
        self.envelope = Some(envelope);
        self
    }

    /// Post-write pacing sleep of one millisecond per frame byte. Gives
    /// slow serial bridges time to ingest before the next operation. On by
    /// default.
    pub fn with_pacing(mut self, pacing: bool) -> Self {
        self.pacing = pacing;
        self
    }

    /// Swap in a freshly opened socket after a reconnect. Timeout, envelope
    /// and pacing settings carry over.
    pub fn rebind(&mut self, stream: S) {
        self.stream = stream;
    }

    async fn read_exact_timed(&mut self, buf: &mut [u8]) -> Result<()> {
        match timeout(self.read_timeout, self.stream.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(Error::Io(format!("read failed: {err}"))),
            Err(_) => Err(Error::Io("read timed out".into())),
        }
    }

    async fn try_read_response(&mut self) -> Result<Response> {
        if self.envelope.is_some() {
            let mut head = [0u8; ENVELOPE_LEN];
            self.read_exact_timed(&mut head).await?;
            WifiEnvelope::parse(&head)?;
        }

        let mut buf = [0u8; codec::MAX_FRAME_LEN];
        self.read_exact_timed(&mut buf[..2]).await?;
        let mut have = 2;
        let total = loop {
            match codec::expected_len(&buf[..have])? {
                Some(total) => break total,
                None => {
                    self.read_exact_timed(&mut buf[have..have + 1]).await?;
                    have += 1;
                }
            }
        };
        if total > have {
            self.read_exact_timed(&mut buf[have..total]).await?;
        }

        let frame = &buf[..total];
        tracing::trace!(frame = %hex(frame), "frame received");
        Ok(codec::decode(frame)?)
    }

    /// Discard whatever is currently buffered on the input side so the
    /// next exchange starts aligned.
    async fn drain(&mut self) {
        let mut scratch = [0u8; 64];
        let mut discarded = 0usize;
        while let Ok(Ok(n)) = timeout(DRAIN_POLL, self.stream.read(&mut scratch)).await {
            if n == 0 {
                break;
            }
            discarded += n;
        }
        if discarded > 0 {
            tracing::debug!(discarded, "drained stale bytes after read failure");
        }
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_message(&mut self, request: &Request) -> Result<()> {
        let frame = codec::encode(request);
        tracing::trace!(frame = %hex(&frame), "writing frame");
        if let Some(envelope) = &self.envelope {
            let head = envelope.encode(frame.len());
            self.stream.write_all(&head).await?;
        }
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        if self.pacing {
            tokio::time::sleep(Duration::from_millis(frame.len() as u64)).await;
        }
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Response> {
        match self.try_read_response().await {
            Ok(response) => Ok(response),
            Err(err) => {
                self.drain().await;
                Err(err)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Shutdown failures on an already-dead socket are not interesting.
        let _ = self.stream.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::crc;
    use tokio::io::duplex;

    fn frame_with_crc(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        let crc = crc::crc16_bytes(&frame);
        frame.extend_from_slice(&crc);
        frame
    }

    #[tokio::test]
    async fn test_write_message_puts_frame_on_the_wire() {
        let (ours, mut theirs) = duplex(1024);
        let mut transport = StreamTransport::new(ours).with_pacing(false);

        let request = Request::read_holding_registers(0x01, 0x0000, 2);
        transport.write_message(&request).await.unwrap();

        let mut wire = [0u8; 8];
        theirs.read_exact(&mut wire).await.unwrap();
        assert_eq!(&wire[..6], &[0x01, 0x03, 0x00, 0x00, 0x00, 0x02]);
        assert!(crc::verify(&wire).is_ok());
    }

    #[tokio::test]
    async fn test_envelope_prefixes_outbound_frame() {
        let (ours, mut theirs) = duplex(1024);
        let mut transport = StreamTransport::new(ours)
            .with_pacing(false)
            .with_envelope(WifiEnvelope::new(254));

        let request = Request::write_single_register(0x01, 0x0001, 7);
        transport.write_message(&request).await.unwrap();

        let mut wire = [0u8; ENVELOPE_LEN + 8];
        theirs.read_exact(&mut wire).await.unwrap();
        assert_eq!(&wire[..4], b"wifi");
        assert_eq!(wire[4], 254);
        assert_eq!(&wire[7..9], &[0x00, 0x08]);
        assert_eq!(wire[ENVELOPE_LEN + 1], 0x06);
    }

    #[tokio::test]
    async fn test_read_response_assembles_fragments() {
        let (ours, mut theirs) = duplex(1024);
        let mut transport = StreamTransport::new(ours).with_pacing(false);

        let frame = frame_with_crc(&[0x01, 0x03, 0x04, 0x00, 0x2A, 0x01, 0x00]);
        let (first, rest) = frame.split_at(3);
        let first = first.to_vec();
        let rest = rest.to_vec();
        tokio::spawn(async move {
            theirs.write_all(&first).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            theirs.write_all(&rest).await.unwrap();
            theirs
        });

        let response = transport.read_response().await.unwrap();
        assert_eq!(response.function(), 0x03);
        assert_eq!(response.data(), &[0x04, 0x00, 0x2A, 0x01, 0x00]);
    }

    #[tokio::test]
    async fn test_read_response_unwraps_envelope() {
        let (ours, mut theirs) = duplex(1024);
        let mut transport = StreamTransport::new(ours)
            .with_pacing(false)
            .with_envelope(WifiEnvelope::new(9));

        let frame = frame_with_crc(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x07]);
        let head = WifiEnvelope::new(9).encode(frame.len());
        theirs.write_all(&head).await.unwrap();
        theirs.write_all(&frame).await.unwrap();

        let response = transport.read_response().await.unwrap();
        assert_eq!(response.function(), 0x06);
    }

    #[tokio::test]
    async fn test_read_times_out_on_silence() {
        let (ours, _theirs) = duplex(1024);
        let mut transport = StreamTransport::new(ours)
            .with_pacing(false)
            .with_read_timeout(Duration::from_millis(20));

        let err = transport.read_response().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_bad_crc_fails_and_drains() {
        let (ours, mut theirs) = duplex(1024);
        let mut transport = StreamTransport::new(ours)
            .with_pacing(false)
            .with_read_timeout(Duration::from_millis(100));

        let mut corrupt = frame_with_crc(&[0x01, 0x03, 0x02, 0x00, 0x2A]);
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;
        // Trailing garbage after the corrupt frame must not survive.
        corrupt.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        theirs.write_all(&corrupt).await.unwrap();

        let err = transport.read_response().await.unwrap_err();
        assert!(err.to_string().contains("CRC"));

        // A clean frame sent afterwards decodes normally.
        let frame = frame_with_crc(&[0x01, 0x03, 0x02, 0x00, 0x2A]);
        theirs.write_all(&frame).await.unwrap();
        let response = transport.read_response().await.unwrap();
        assert_eq!(response.data(), &[0x02, 0x00, 0x2A]);
    }

    #[tokio::test]
    async fn test_read_request_not_supported() {
        let (ours, _theirs) = duplex(64);
        let mut transport = StreamTransport::new(ours).with_pacing(false);
        assert!(matches!(
            transport.read_request().await,
            Err(Error::NotSupported(_))
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (ours, _theirs) = duplex(64);
        let mut transport = StreamTransport::new(ours).with_pacing(false);
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }
}
