//! Transaction executor - one request/response exchange per call.
//!
//! `execute()` runs the full exchange against a shared connection:
//!
//! 1. take the per-connection lock (later callers park here, so at most
//!    one exchange is ever in flight per channel)
//! 2. connect if the link reports down
//! 3. re-fetch the transport adapter, which a reconnect may have rebound
//! 4. write the request, read the response
//! 5. on transport failure, retry the write/read pair up to the configured
//!    retry count
//! 6. map an exception response to [`Error::Slave`], keeping the decoded
//!    frame readable through [`Transaction::response`]
//! 7. in reconnect-per-call mode, close the connection
//! 8. optionally check that the response corresponds to the request
//!
//! The lock guard releases on every exit path, including cancellation by
//! dropping the future.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::message::exception_name;
use crate::protocol::{Request, Response};
use crate::transport::Transport;

/// Process-wide transaction counter, stamped on requests for log
/// correlation. RTU framing carries no transaction field on the wire.
static TRANSACTION_ID: AtomicU16 = AtomicU16::new(0);

fn next_transaction_id() -> u16 {
    TRANSACTION_ID.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}

/// A Modbus master transaction bound to a shared connection.
pub struct Transaction<C: Connection> {
    connection: Arc<Mutex<C>>,
    request: Option<Request>,
    response: Option<Response>,
    checking_validity: bool,
    reconnecting: bool,
    retries: u32,
}

impl<C: Connection> Transaction<C> {
    pub fn new(connection: Arc<Mutex<C>>) -> Self {
        Self {
            connection,
            request: None,
            response: None,
            checking_validity: false,
            reconnecting: false,
            retries: 0,
        }
    }

    pub fn with_request(connection: Arc<Mutex<C>>, request: Request) -> Self {
        let mut transaction = Self::new(connection);
        transaction.set_request(request);
        transaction
    }

    /// Set the request for the next `execute()`. Clears any previous
    /// response.
    pub fn set_request(&mut self, request: Request) {
        self.request = Some(request);
        self.response = None;
    }

    #[inline]
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// The last decoded response. Populated even when `execute()` returned
    /// [`Error::Slave`].
    #[inline]
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Check request/response correspondence after each exchange. Off by
    /// default.
    pub fn set_checking_validity(&mut self, checking: bool) {
        self.checking_validity = checking;
    }

    #[inline]
    pub fn is_checking_validity(&self) -> bool {
        self.checking_validity
    }

    /// Close the connection after every successful exchange, forcing the
    /// next one to reconnect. Off by default.
    pub fn set_reconnecting(&mut self, reconnecting: bool) {
        self.reconnecting = reconnecting;
    }

    #[inline]
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    /// How many times a failed write/read pair is retried. Default 0.
    pub fn set_retries(&mut self, retries: u32) {
        self.retries = retries;
    }

    #[inline]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Run one full exchange.
    pub async fn execute(&mut self) -> Result<()> {
        let request = {
            let request = self.request.as_mut().ok_or(Error::NotExecutable)?;
            request.set_transaction_id(next_transaction_id());
            request.clone()
        };
        let tid = request.transaction_id();

        let connection = Arc::clone(&self.connection);
        let mut connection = connection.lock().await;

        let mut attempt = 0u32;
        let response = loop {
            if !connection.is_connected() {
                connection.connect().await.map_err(|err| match err {
                    err @ Error::Connect(_) => err,
                    other => Error::Connect(other.to_string()),
                })?;
            }
            // A reconnect may have rebound the adapter; fetch it fresh.
            let transport = connection.transport()?;

            let outcome = match transport.write_message(&request).await {
                Ok(()) => transport.read_response().await,
                Err(err) => Err(err),
            };

            match outcome {
                Ok(response) => break response,
                Err(err @ Error::Io(_)) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(tid, attempt, %err, "exchange failed, retrying");
                }
                Err(err) => {
                    tracing::debug!(tid, %err, "exchange failed");
                    return Err(err);
                }
            }
        };

        tracing::debug!(tid, function = response.function(), "exchange complete");

        let is_exception = response.is_exception();
        let exception_code = response.exception_code();
        self.response = Some(response);

        if is_exception {
            let code = exception_code.unwrap_or(0);
            tracing::warn!(tid, code, name = exception_name(code), "slave exception");
            return Err(Error::Slave(code));
        }

        if self.reconnecting {
            connection.close().await?;
        }

        if self.checking_validity {
            self.check_validity(&request)?;
        }

        Ok(())
    }

    fn check_validity(&self, request: &Request) -> Result<()> {
        let Some(response) = self.response.as_ref() else {
            return Ok(());
        };
        if !response.matches(request) {
            return Err(Error::InvalidResponse(format!(
                "response unit {} fc {:#04x} does not correspond to request unit {} fc {:#04x}",
                response.unit_id(),
                response.function(),
                request.unit_id(),
                request.function()
            )));
        }
        Ok(())
    }
}
