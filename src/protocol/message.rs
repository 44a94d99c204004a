//! Modbus request and response messages.
//!
//! Messages are headless: a unit id, a function code and the raw body
//! bytes. CRC and length handling live in [`crate::codec`]; a message never
//! carries its checksum.

use std::fmt;

/// A master request addressed to one slave unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    unit_id: u8,
    function: u8,
    data: Vec<u8>,
    transaction_id: u16,
}

impl Request {
    /// Build a request from raw body bytes.
    pub fn new(unit_id: u8, function: u8, data: Vec<u8>) -> Self {
        Self {
            unit_id,
            function,
            data,
            transaction_id: 0,
        }
    }

    /// Read Coils (0x01).
    pub fn read_coils(unit_id: u8, address: u16, count: u16) -> Self {
        Self::read_request(unit_id, 0x01, address, count)
    }

    /// Read Discrete Inputs (0x02).
    pub fn read_discrete_inputs(unit_id: u8, address: u16, count: u16) -> Self {
        Self::read_request(unit_id, 0x02, address, count)
    }

    /// Read Holding Registers (0x03).
    pub fn read_holding_registers(unit_id: u8, address: u16, count: u16) -> Self {
        Self::read_request(unit_id, 0x03, address, count)
    }

    /// Read Input Registers (0x04).
    pub fn read_input_registers(unit_id: u8, address: u16, count: u16) -> Self {
        Self::read_request(unit_id, 0x04, address, count)
    }

    /// Write Single Coil (0x05). The wire value is `0xFF00` for on,
    /// `0x0000` for off.
    pub fn write_single_coil(unit_id: u8, address: u16, on: bool) -> Self {
        let value: u16 = if on { 0xFF00 } else { 0x0000 };
        let mut data = Vec::with_capacity(4);
        data.extend_from_slice(&address.to_be_bytes());
        data.extend_from_slice(&value.to_be_bytes());
        Self::new(unit_id, 0x05, data)
    }

    /// Write Single Register (0x06).
    pub fn write_single_register(unit_id: u8, address: u16, value: u16) -> Self {
        let mut data = Vec::with_capacity(4);
        data.extend_from_slice(&address.to_be_bytes());
        data.extend_from_slice(&value.to_be_bytes());
        Self::new(unit_id, 0x06, data)
    }

    fn read_request(unit_id: u8, function: u8, address: u16, count: u16) -> Self {
        let mut data = Vec::with_capacity(4);
        data.extend_from_slice(&address.to_be_bytes());
        data.extend_from_slice(&count.to_be_bytes());
        Self::new(unit_id, function, data)
    }

    #[inline]
    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    #[inline]
    pub fn function(&self) -> u8 {
        self.function
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Diagnostic correlation id stamped by the transaction executor.
    /// Never serialized; RTU framing has no transaction field.
    #[inline]
    pub fn transaction_id(&self) -> u16 {
        self.transaction_id
    }

    pub(crate) fn set_transaction_id(&mut self, id: u16) {
        self.transaction_id = id;
    }

    /// Serialize the headless PDU: `[unit id][function code][body...]`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.data.len());
        out.push(self.unit_id);
        out.push(self.function);
        out.extend_from_slice(&self.data);
        out
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request(tid={} unit={} fc={:#04x} len={})",
            self.transaction_id,
            self.unit_id,
            self.function,
            self.data.len()
        )
    }
}

/// A slave response, as decoded by [`crate::codec::decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    unit_id: u8,
    function: u8,
    data: Vec<u8>,
}

impl Response {
    pub fn new(unit_id: u8, function: u8, data: Vec<u8>) -> Self {
        Self {
            unit_id,
            function,
            data,
        }
    }

    #[inline]
    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    #[inline]
    pub fn function(&self) -> u8 {
        self.function
    }

    /// Body bytes between the function code and the CRC. For read
    /// responses the first byte is the count field.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// True when the function code has the exception bit (0x80) set.
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function & 0x80 != 0
    }

    /// The Modbus exception code, when this is an exception response.
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() {
            self.data.first().copied()
        } else {
            None
        }
    }

    /// Whether this response corresponds to `request`: same unit id and
    /// either the same function code or its exception counterpart.
    pub fn matches(&self, request: &Request) -> bool {
        self.unit_id == request.unit_id()
            && (self.function == request.function()
                || self.function == (request.function() | 0x80))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "response(unit={} fc={:#04x} len={})",
            self.unit_id,
            self.function,
            self.data.len()
        )
    }
}

/// Human-readable name for a Modbus exception code.
pub fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "illegal function",
        0x02 => "illegal data address",
        0x03 => "illegal data value",
        0x04 => "slave device failure",
        0x05 => "acknowledge",
        0x06 => "slave device busy",
        0x08 => "memory parity error",
        0x0A => "gateway path unavailable",
        0x0B => "gateway target failed to respond",
        _ => "unknown exception",
    }
}
