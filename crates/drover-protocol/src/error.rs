//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding envelopes
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Message parsed as JSON but matched no known envelope shape
    #[error("Unrecognized envelope shape")]
    UnknownEnvelope,

    /// A `type` field was present but carried an unknown value
    #[error("Unknown envelope type: {0}")]
    UnknownType(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
