//! drover agent daemon

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drover_core::config::{self, AgentConfig};
use drover_core::ClientId;

use drover_agent::register;
use drover_agent::runner::ShellRunner;
use drover_agent::Supervisor;

#[derive(Parser)]
#[command(name = "drover-agent")]
#[command(about = "drover agent daemon")]
#[command(version)]
struct Args {
    /// Coordinator base URL (overrides config)
    #[arg(short, long)]
    server: Option<String>,

    /// Single-use registration token, required on first run
    #[arg(short, long, env = "DROVER_TOKEN")]
    token: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

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

    tracing::info!("drover agent starting...");

    let config_path = args
        .config
        .unwrap_or_else(|| config::default_config_dir().join("agent.toml"));
    let mut config: AgentConfig = if config_path.exists() {
        config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        tracing::info!("Using default configuration");
        AgentConfig::default()
    };
    if let Some(server) = args.server {
        config.server_url = server;
    }

    // First run: trade the registration token for an identity and persist it
    if !config.is_registered() {
        let Some(token) = args.token else {
            bail!("Agent is not registered; provide a registration token with --token");
        };
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        let (client_id, credential) =
            register::register(&config.server_url, &token, &hostname).await?;
        config.client_id = Some(client_id.to_string());
        config.credential = Some(credential);
        config::save_config(&config_path, &config)
            .with_context(|| format!("Failed to save config to {:?}", config_path))?;
        tracing::info!("Registration saved to {:?}", config_path);
    }

    // is_registered held above, so both are present
    let (Some(client_id), Some(credential)) =
        (config.client_id.clone(), config.credential.clone())
    else {
        bail!("Config is missing client_id or credential");
    };

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let supervisor = Supervisor::new(
        config,
        ClientId::new(client_id),
        credential,
        Arc::new(ShellRunner),
        cancel,
    );
    supervisor.run().await?;

    tracing::info!("Agent shutdown complete");
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
