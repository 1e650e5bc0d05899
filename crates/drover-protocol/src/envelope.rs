//! Envelope types for the drover protocol
//!
//! Three envelopes travel over the agent transport, all JSON-encoded text
//! frames:
//!
//! 1. `Heartbeat` (agent → coordinator), tagged with `"type":"heartbeat"`
//! 2. `Dispatch` (coordinator → agent), untagged: `{"id":..,"command":..}`
//! 3. `Result` (agent → coordinator), untagged: `{"command_id":..,"status":..}`
//!
//! The dispatch and result envelopes carry no `type` field; they are
//! distinguished structurally by their required keys. Decoding inspects the
//! keys before deserializing, so a malformed message is rejected as a whole
//! and can never be misread as a different envelope.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Outcome reported by the agent for one executed command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// Command ran and exited successfully
    Success,
    /// Command failed to run or exited with an error
    Error,
}

/// A protocol envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Periodic liveness signal from the agent
    Heartbeat {
        /// Agent identifier, echoed so the coordinator can cross-check
        client_id: String,
        /// Unix timestamp in seconds at send time
        timestamp: u64,
    },

    /// Command pushed from the coordinator to the agent
    Dispatch {
        /// Command identifier, echoed back in the result
        id: String,
        /// Shell command text
        command: String,
    },

    /// Execution result returned by the agent
    Result {
        /// Identifier of the command this result answers
        command_id: String,
        /// Whether execution succeeded
        status: ResultStatus,
        /// Captured output (empty on error)
        result: String,
        /// Error description when status is `Error`
        error: Option<String>,
    },
}

// Wire-level structs. These mirror the JSON field names exactly; `Envelope`
// is the API surface so callers never see serde attributes.

#[derive(Serialize, Deserialize)]
struct WireHeartbeat {
    #[serde(rename = "type")]
    kind: String,
    client_id: String,
    timestamp: u64,
}

#[derive(Serialize, Deserialize)]
struct WireDispatch {
    id: String,
    command: String,
}

#[derive(Serialize, Deserialize)]
struct WireResult {
    command_id: String,
    status: ResultStatus,
    #[serde(default)]
    result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Envelope {
    /// Encode this envelope as a JSON text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let text = match self {
            Envelope::Heartbeat {
                client_id,
                timestamp,
            } => serde_json::to_string(&WireHeartbeat {
                kind: "heartbeat".to_string(),
                client_id: client_id.clone(),
                timestamp: *timestamp,
            })?,
            Envelope::Dispatch { id, command } => serde_json::to_string(&WireDispatch {
                id: id.clone(),
                command: command.clone(),
            })?,
            Envelope::Result {
                command_id,
                status,
                result,
                error,
            } => serde_json::to_string(&WireResult {
                command_id: command_id.clone(),
                status: *status,
                result: result.clone(),
                error: error.clone(),
            })?,
        };
        Ok(text)
    }

    /// Decode a JSON text frame into an envelope
    ///
    /// Discrimination is structural: a `type` field selects the tagged
    /// envelopes, otherwise the presence of `command_id` or `id` selects
    /// result or dispatch respectively.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        let object = value.as_object().ok_or(ProtocolError::UnknownEnvelope)?;

        if let Some(kind) = object.get("type") {
            return match kind.as_str() {
                Some("heartbeat") => {
                    let wire: WireHeartbeat = serde_json::from_value(value)?;
                    Ok(Envelope::Heartbeat {
                        client_id: wire.client_id,
                        timestamp: wire.timestamp,
                    })
                }
                Some(other) => Err(ProtocolError::UnknownType(other.to_string())),
                None => Err(ProtocolError::UnknownEnvelope),
            };
        }

        if object.contains_key("command_id") {
            let wire: WireResult = serde_json::from_value(value)?;
            return Ok(Envelope::Result {
                command_id: wire.command_id,
                status: wire.status,
                result: wire.result,
                error: wire.error,
            });
        }

        if object.contains_key("id") && object.contains_key("command") {
            let wire: WireDispatch = serde_json::from_value(value)?;
            return Ok(Envelope::Dispatch {
                id: wire.id,
                command: wire.command,
            });
        }

        Err(ProtocolError::UnknownEnvelope)
    }
}
