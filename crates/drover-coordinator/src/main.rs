//! drover coordinator daemon
//!
//! Accepts persistent WebSocket sessions from agents and serves the
//! operator HTTP API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drover_core::auth::{self, MacCredentials};
use drover_core::config::{self, CoordinatorConfig};
use drover_core::store::{
    AgentStore, CommandStore, MemoryStore, RegistrationToken, TokenStore,
};
use drover_core::time::current_time_secs;

use drover_coordinator::monitor::HeartbeatMonitor;
use drover_coordinator::{http, CoordinatorState};

/// Bootstrap registration tokens stay valid for a day
const BOOTSTRAP_TOKEN_TTL_SECS: u64 = 86_400;

#[derive(Parser)]
#[command(name = "drover-coordinator")]
#[command(about = "drover coordinator daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Operator API key (overrides config)
    #[arg(long, env = "DROVER_OPERATOR_KEY")]
    operator_key: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("drover coordinator starting...");

    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_dir().join("coordinator.toml");
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                CoordinatorConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            CoordinatorConfig::default()
        }
    };

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(key) = args.operator_key {
        config.operator_key = key;
    }
    if config.operator_key.is_empty() {
        tracing::warn!("No operator key configured - operator endpoints will refuse all requests");
    }
    if config.credential_secret.is_empty() {
        tracing::warn!("No credential secret configured - agent credentials will not survive a restart");
        config.credential_secret = auth::generate_secret();
    }

    let store = Arc::new(MemoryStore::new());
    let credentials = MacCredentials::new(config.credential_secret.clone());
    let state = Arc::new(CoordinatorState::new(
        config.clone(),
        Arc::clone(&store) as Arc<dyn AgentStore>,
        Arc::clone(&store) as Arc<dyn CommandStore>,
        Arc::clone(&store) as Arc<dyn TokenStore>,
        credentials,
    ));

    // One token to get the first agent enrolled; further tokens come from
    // the operator surface of a durable deployment.
    let bootstrap = auth::generate_registration_token();
    state
        .tokens
        .issue_token(RegistrationToken {
            token: bootstrap.clone(),
            expires_at: current_time_secs() + BOOTSTRAP_TOKEN_TTL_SECS,
        })
        .await?;
    tracing::info!("Bootstrap registration token: {}", bootstrap);

    let cancel = state.shutdown.clone();
    spawn_signal_handler(cancel.clone());

    let monitor = HeartbeatMonitor::new(
        state.config.heartbeat_sweep_interval,
        state.config.heartbeat_timeout,
    );
    tokio::spawn(monitor.run(Arc::clone(&state.registry), cancel.clone()));
    tokio::spawn(Arc::clone(&state.dispatcher).run_expiry_sweep(
        state.config.command_sweep_interval,
        state.config.command_timeout,
        cancel.clone(),
    ));

    let app = http::router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&state.config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", state.config.bind_address))?;
    tracing::info!("Listening on {}", state.config.bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await
    .context("Server error")?;

    tracing::info!("Coordinator shutdown complete");
    Ok(())
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel.cancel();
    });
}
