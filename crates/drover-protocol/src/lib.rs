//! drover-protocol: Wire protocol for the drover agent transport
//!
//! This crate defines the JSON envelopes exchanged between the coordinator
//! and agents over the persistent WebSocket connection.

pub mod envelope;
pub mod error;

pub use envelope::{Envelope, ResultStatus};
pub use error::ProtocolError;
