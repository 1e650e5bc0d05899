//! Agent configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::coordinator::BackoffConfig;
use super::serde_utils::duration_secs;

/// Configuration for the agent daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Coordinator base URL (http:// or https://)
    pub server_url: String,

    /// Client identifier assigned at registration. None until the agent
    /// has registered.
    pub client_id: Option<String>,

    /// Signed credential issued at registration, presented on the
    /// WebSocket upgrade.
    pub credential: Option<String>,

    /// How often to send heartbeats over the socket
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// Timeout for each connection attempt
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Reconnection backoff
    pub backoff: BackoffConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            client_id: None,
            credential: None,
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
        }
    }
}

impl AgentConfig {
    /// True once the agent holds an identity it can connect with
    pub fn is_registered(&self) -> bool {
        self.client_id.is_some() && self.credential.is_some()
    }
}
