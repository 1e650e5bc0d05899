//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the coordinator daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Address to bind the HTTP/WebSocket server to
    pub bind_address: String,

    /// How long a session may go without a heartbeat before it is
    /// considered dead. Should be a small multiple of the agents'
    /// send interval to tolerate a missed beat or two.
    #[serde(with = "duration_secs")]
    pub heartbeat_timeout: Duration,

    /// How often the heartbeat monitor sweeps live sessions
    #[serde(with = "duration_secs")]
    pub heartbeat_sweep_interval: Duration,

    /// How long a command may sit in `executing` before the expiry sweep
    /// fails it. Covers agents that die silently mid-execution.
    #[serde(with = "duration_secs")]
    pub command_timeout: Duration,

    /// How often the command expiry sweep runs
    #[serde(with = "duration_secs")]
    pub command_sweep_interval: Duration,

    /// Bearer key operators must present on /clients, /command, and
    /// /commands. Empty means operator endpoints are refused outright.
    pub operator_key: String,

    /// Secret used to sign agent credentials. Generated at startup when
    /// empty (credentials then do not survive a restart).
    pub credential_secret: String,

    /// Depth of each session's outbound command queue
    pub outbound_queue_depth: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            heartbeat_timeout: Duration::from_secs(90),
            heartbeat_sweep_interval: Duration::from_secs(15),
            command_timeout: Duration::from_secs(900),
            command_sweep_interval: Duration::from_secs(30),
            operator_key: String::new(),
            credential_secret: String::new(),
            outbound_queue_depth: 64,
        }
    }
}

/// Exponential backoff configuration for agent reconnection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}
