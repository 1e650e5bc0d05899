//! Persistence traits for agents, commands, and registration tokens.
//!
//! The coordinator only talks to these traits; [`MemoryStore`] is the
//! in-process implementation. A durable backend would implement the same
//! traits.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{AgentRecord, AgentStatus, ClientId, CommandId, CommandRecord, CommandStatus};

/// A single-use registration token with an expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationToken {
    pub token: String,
    /// Unix seconds after which the token is no longer valid
    pub expires_at: u64,
}

/// Storage for registered agents
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn insert_agent(&self, record: AgentRecord) -> Result<(), StoreError>;

    async fn agent(&self, id: &ClientId) -> Result<Option<AgentRecord>, StoreError>;

    async fn list_agents(&self) -> Result<Vec<AgentRecord>, StoreError>;

    /// Update an agent's status and last-seen timestamp. Unknown agents
    /// are a [`StoreError::NotFound`].
    async fn update_agent_status(
        &self,
        id: &ClientId,
        status: AgentStatus,
        last_seen: u64,
    ) -> Result<(), StoreError>;
}

/// Storage for commands and their lifecycle
#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn insert_command(&self, record: CommandRecord) -> Result<(), StoreError>;

    async fn command(&self, id: &CommandId) -> Result<Option<CommandRecord>, StoreError>;

    /// All commands for a client, in submission order
    async fn list_for_client(&self, client: &ClientId) -> Result<Vec<CommandRecord>, StoreError>;

    /// Move a pending command to executing, recording the dispatch time.
    /// Returns false when the command is not currently pending, so callers
    /// never regress a later state.
    async fn mark_executing(&self, id: &CommandId, dispatched_at: u64)
        -> Result<bool, StoreError>;

    /// Move an executing command to a terminal state, recording its output.
    /// Returns false when the command is not currently executing; duplicate
    /// or stale results are discarded this way.
    async fn complete_command(
        &self,
        id: &CommandId,
        status: CommandStatus,
        result: String,
        error: Option<String>,
    ) -> Result<bool, StoreError>;

    /// Pending commands for a client, oldest first. Used to flush the
    /// backlog when a session comes up.
    async fn pending_for_client(&self, client: &ClientId)
        -> Result<Vec<CommandRecord>, StoreError>;

    /// Executing commands dispatched before the given Unix-seconds cutoff
    async fn executing_older_than(&self, cutoff: u64) -> Result<Vec<CommandRecord>, StoreError>;
}

/// Storage for single-use registration tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn issue_token(&self, token: RegistrationToken) -> Result<(), StoreError>;

    /// Consume a token. Returns true exactly once per valid, unexpired
    /// token; the token is removed whether or not it had expired.
    async fn consume_token(&self, token: &str, now: u64) -> Result<bool, StoreError>;
}
