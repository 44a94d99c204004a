//! Error types for rtulink.

use thiserror::Error;

/// Main error type for all master operations.
///
/// Frame-level faults (CRC mismatch, unknown function code, truncation) are
/// wrapped into [`Error::Io`] before they reach a caller, so a write/read
/// pair has a single transport-failure surface to branch on. A
/// [`Error::Slave`] is the one application-level fault: the peer answered,
/// but with a Modbus exception frame.
#[derive(Debug, Error)]
pub enum Error {
    /// Transaction has no request set. Programmer error, never retried.
    #[error("transaction not executable: no request set")]
    NotExecutable,

    /// Opening the physical channel failed. The connection stays
    /// disconnected.
    #[error("connecting failed: {0}")]
    Connect(String),

    /// Transport-level failure: write, read, timeout, CRC or framing.
    #[error("I/O failure: {0}")]
    Io(String),

    /// The peer returned a Modbus exception response carrying this code.
    #[error("slave exception code {0:#04x}")]
    Slave(u8),

    /// Slave-side operation attempted on a master-only transport.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// Response does not correspond to the request (validity check).
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Frame-level fault raised by the codec and the reassembly buffer.
///
/// These never cross the transport boundary as-is; adapters convert them
/// into [`Error::Io`] via the `From` impl below.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Recomputed CRC does not match the trailing CRC field.
    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    Crc { expected: u16, actual: u16 },

    /// Function code outside the length table.
    #[error("unknown or unsupported function code {0:#04x}")]
    UnknownFunction(u8),

    /// Buffer ends before the length rule is satisfied.
    #[error("truncated frame: need {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Advertised length exceeds the RTU maximum frame size.
    #[error("frame length {0} exceeds the RTU maximum")]
    TooLong(usize),

    /// Malformed vendor envelope header on an inbound frame.
    #[error("bad envelope header")]
    BadEnvelope,
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_wraps_into_io() {
        let err: Error = FrameError::UnknownFunction(0x42).into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("0x42"));
    }

    #[test]
    fn test_io_error_wraps_into_io() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_slave_error_is_distinct_from_io() {
        let slave = Error::Slave(0x02);
        assert!(!matches!(slave, Error::Io(_)));
        assert!(slave.to_string().contains("0x02"));
    }
}
