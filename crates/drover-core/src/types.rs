//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::current_time_secs;

/// Unique identifier for a registered agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    /// Create a client ID from an existing string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh collision-resistant client ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a submitted command
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub String);

impl CommandId {
    /// Create a command ID from an existing string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh collision-resistant command ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CommandId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CommandId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of an agent
///
/// An agent moves `registered → connected → disconnected` and then cycles
/// between connected and disconnected for the rest of its life. There is no
/// transition back to registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Registered but has never held a live session
    Registered,
    /// Currently holds a live session
    Connected,
    /// Previously connected, session gone
    Disconnected,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Registered => write!(f, "registered"),
            AgentStatus::Connected => write!(f, "connected"),
            AgentStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Lifecycle status of a command
///
/// Transitions are monotonic: `pending → executing → {completed|failed}`,
/// with `pending → failed` permitted for expiry of commands whose target
/// never became reachable. A command never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// Persisted, not yet handed to a live session
    Pending,
    /// Handed to a live session, awaiting result
    Executing,
    /// Result received, execution succeeded
    Completed,
    /// Result received with an error, or expired
    Failed,
}

impl CommandStatus {
    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Pending => write!(f, "pending"),
            CommandStatus::Executing => write!(f, "executing"),
            CommandStatus::Completed => write!(f, "completed"),
            CommandStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A registered agent as held by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent identifier assigned at registration
    pub id: ClientId,
    /// Hostname reported at registration
    pub hostname: String,
    /// Last known address
    pub ip: String,
    /// Current lifecycle status
    pub status: AgentStatus,
    /// Unix timestamp (seconds) of the last heartbeat or status change
    pub last_seen: u64,
}

impl AgentRecord {
    /// Create a freshly registered agent record
    pub fn new(id: ClientId, hostname: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            id,
            hostname: hostname.into(),
            ip: ip.into(),
            status: AgentStatus::Registered,
            last_seen: current_time_secs(),
        }
    }
}

/// A submitted command as held by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Command identifier
    pub id: CommandId,
    /// Target agent
    pub client_id: ClientId,
    /// Shell command text
    pub command: String,
    /// Current lifecycle status
    pub status: CommandStatus,
    /// Captured output, present once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Error description, present once failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix timestamp (seconds) at submission
    pub created_at: u64,
    /// Unix timestamp (seconds) at dispatch to a live session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<u64>,
    /// Unix timestamp (seconds) at completion or failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}

impl CommandRecord {
    /// Create a new pending command record
    pub fn new(client_id: ClientId, command: impl Into<String>) -> Self {
        Self {
            id: CommandId::generate(),
            client_id,
            command: command.into(),
            status: CommandStatus::Pending,
            result: None,
            error: None,
            created_at: current_time_secs(),
            dispatched_at: None,
            completed_at: None,
        }
    }
}
