//! In-memory store backed by `RwLock`-guarded collections.
//!
//! Commands live in a `Vec` so listings preserve submission order without a
//! secondary index.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::types::{AgentRecord, AgentStatus, ClientId, CommandId, CommandRecord, CommandStatus};

use super::{AgentStore, CommandStore, RegistrationToken, TokenStore};

/// In-process implementation of all store traits
#[derive(Default)]
pub struct MemoryStore {
    agents: RwLock<HashMap<ClientId, AgentRecord>>,
    commands: RwLock<Vec<CommandRecord>>,
    tokens: RwLock<HashMap<String, RegistrationToken>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Internal(format!("{what} lock poisoned"))
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn insert_agent(&self, record: AgentRecord) -> Result<(), StoreError> {
        let mut agents = self.agents.write().map_err(|_| poisoned("agents"))?;
        agents.insert(record.id.clone(), record);
        Ok(())
    }

    async fn agent(&self, id: &ClientId) -> Result<Option<AgentRecord>, StoreError> {
        let agents = self.agents.read().map_err(|_| poisoned("agents"))?;
        Ok(agents.get(id).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>, StoreError> {
        let agents = self.agents.read().map_err(|_| poisoned("agents"))?;
        let mut list: Vec<_> = agents.values().cloned().collect();
        list.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(list)
    }

    async fn update_agent_status(
        &self,
        id: &ClientId,
        status: AgentStatus,
        last_seen: u64,
    ) -> Result<(), StoreError> {
        let mut agents = self.agents.write().map_err(|_| poisoned("agents"))?;
        let record = agents
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.status = status;
        record.last_seen = last_seen;
        Ok(())
    }
}

#[async_trait]
impl CommandStore for MemoryStore {
    async fn insert_command(&self, record: CommandRecord) -> Result<(), StoreError> {
        let mut commands = self.commands.write().map_err(|_| poisoned("commands"))?;
        commands.push(record);
        Ok(())
    }

    async fn command(&self, id: &CommandId) -> Result<Option<CommandRecord>, StoreError> {
        let commands = self.commands.read().map_err(|_| poisoned("commands"))?;
        Ok(commands.iter().find(|c| &c.id == id).cloned())
    }

    async fn list_for_client(&self, client: &ClientId) -> Result<Vec<CommandRecord>, StoreError> {
        let commands = self.commands.read().map_err(|_| poisoned("commands"))?;
        Ok(commands
            .iter()
            .filter(|c| &c.client_id == client)
            .cloned()
            .collect())
    }

    async fn mark_executing(
        &self,
        id: &CommandId,
        dispatched_at: u64,
    ) -> Result<bool, StoreError> {
        let mut commands = self.commands.write().map_err(|_| poisoned("commands"))?;
        match commands.iter_mut().find(|c| &c.id == id) {
            Some(record) if record.status == CommandStatus::Pending => {
                record.status = CommandStatus::Executing;
                record.dispatched_at = Some(dispatched_at);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn complete_command(
        &self,
        id: &CommandId,
        status: CommandStatus,
        result: String,
        error: Option<String>,
    ) -> Result<bool, StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::Internal(format!(
                "completion requires a terminal status, got {status}"
            )));
        }
        let mut commands = self.commands.write().map_err(|_| poisoned("commands"))?;
        match commands.iter_mut().find(|c| &c.id == id) {
            Some(record) if record.status == CommandStatus::Executing => {
                record.status = status;
                record.result = Some(result);
                record.error = error;
                record.completed_at = Some(crate::time::current_time_secs());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn pending_for_client(
        &self,
        client: &ClientId,
    ) -> Result<Vec<CommandRecord>, StoreError> {
        let commands = self.commands.read().map_err(|_| poisoned("commands"))?;
        Ok(commands
            .iter()
            .filter(|c| &c.client_id == client && c.status == CommandStatus::Pending)
            .cloned()
            .collect())
    }

    async fn executing_older_than(&self, cutoff: u64) -> Result<Vec<CommandRecord>, StoreError> {
        let commands = self.commands.read().map_err(|_| poisoned("commands"))?;
        Ok(commands
            .iter()
            .filter(|c| {
                c.status == CommandStatus::Executing
                    && c.dispatched_at.map_or(false, |t| t < cutoff)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn issue_token(&self, token: RegistrationToken) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().map_err(|_| poisoned("tokens"))?;
        tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn consume_token(&self, token: &str, now: u64) -> Result<bool, StoreError> {
        let mut tokens = self.tokens.write().map_err(|_| poisoned("tokens"))?;
        match tokens.remove(token) {
            Some(record) => Ok(record.expires_at >= now),
            None => Ok(false),
        }
    }
}
