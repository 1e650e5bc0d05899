//! Shared coordinator state

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use drover_core::auth::MacCredentials;
use drover_core::config::CoordinatorConfig;
use drover_core::store::{AgentStore, CommandStore, TokenStore};

use crate::dispatch::Dispatcher;
use crate::registry::SessionRegistry;

/// Everything the HTTP handlers and background tasks share
pub struct CoordinatorState {
    pub config: CoordinatorConfig,
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub agents: Arc<dyn AgentStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub credentials: MacCredentials,
    pub shutdown: CancellationToken,
}

impl CoordinatorState {
    pub fn new(
        config: CoordinatorConfig,
        agents: Arc<dyn AgentStore>,
        commands: Arc<dyn CommandStore>,
        tokens: Arc<dyn TokenStore>,
        credentials: MacCredentials,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(commands, Arc::clone(&registry)));
        Self {
            config,
            registry,
            dispatcher,
            agents,
            tokens,
            credentials,
            shutdown: CancellationToken::new(),
        }
    }
}
