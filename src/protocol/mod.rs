//! Protocol module - messages, reassembly, and the vendor envelope.

pub mod envelope;
pub mod message;
pub mod reassembly;

pub use envelope::WifiEnvelope;
pub use message::{Request, Response};
pub use reassembly::ReassemblyBuffer;
