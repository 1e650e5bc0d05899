//! Connection supervisor
//!
//! One loop owns the agent's session lifecycle: connect, serve until the
//! socket drops, back off, reconnect. Command execution is spawned off the
//! serve loop so a long-running command never blocks heartbeats, and a
//! single-flight connect means the agent never holds two sessions.

use anyhow::{anyhow, Context, Result};
use futures::stream::StreamExt;
use futures::SinkExt;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drover_core::config::AgentConfig;
use drover_core::time::current_time_secs;
use drover_core::ClientId;
use drover_protocol::{Envelope, ResultStatus};

use crate::backoff::{BackoffPolicy, ExponentialBackoff};
use crate::runner::CommandRunner;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Depth of the results channel between execution tasks and the serve loop
const RESULT_QUEUE_DEPTH: usize = 32;

pub struct Supervisor {
    config: AgentConfig,
    client_id: ClientId,
    credential: String,
    runner: Arc<dyn CommandRunner>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(
        config: AgentConfig,
        client_id: ClientId,
        credential: String,
        runner: Arc<dyn CommandRunner>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            client_id,
            credential,
            runner,
            cancel,
        }
    }

    /// Run until cancelled, reconnecting with backoff after every drop
    pub async fn run(&self) -> Result<()> {
        let mut backoff = ExponentialBackoff::from_config(&self.config.backoff);
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            match self.connect().await {
                Ok(ws) => {
                    info!(client_id = %self.client_id, "connected to coordinator");
                    backoff.reset();
                    if let Err(e) = self.serve(ws).await {
                        warn!(error = %e, "session ended with error");
                    } else {
                        info!("session closed");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "connection attempt failed");
                }
            }

            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let delay = backoff.next_delay();
            info!(delay_secs = delay.as_secs(), "reconnecting after delay");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return Ok(()),
            }
        }
    }

    async fn connect(&self) -> Result<WsStream> {
        let url = ws_url(&self.config.server_url, &self.client_id)?;
        let mut request = url
            .clone()
            .into_client_request()
            .context("Invalid coordinator URL")?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", self.credential)
                .parse()
                .context("Credential is not a valid header value")?,
        );

        let (ws, _) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| anyhow!("Connection to {url} timed out"))?
        .with_context(|| format!("WebSocket handshake with {url} failed"))?;
        Ok(ws)
    }

    /// Drive one live session until the socket drops or shutdown
    async fn serve(&self, ws: WsStream) -> Result<()> {
        let (mut sink, mut stream) = ws.split();
        let (result_tx, mut result_rx) = mpsc::channel::<Envelope>(RESULT_QUEUE_DEPTH);
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let envelope = Envelope::Heartbeat {
                        client_id: self.client_id.to_string(),
                        timestamp: current_time_secs(),
                    };
                    let text = envelope.encode().context("Heartbeat encoding failed")?;
                    sink.send(Message::Text(text))
                        .await
                        .context("Heartbeat send failed")?;
                    debug!("heartbeat sent");
                }
                maybe = result_rx.recv() => {
                    // The supervisor holds a sender, so the channel stays open
                    let Some(envelope) = maybe else { continue };
                    let text = envelope.encode().context("Result encoding failed")?;
                    sink.send(Message::Text(text))
                        .await
                        .context("Result send failed")?;
                }
                maybe = stream.next() => {
                    match maybe {
                        Some(Ok(Message::Text(text))) => self.on_message(&text, &result_tx),
                        Some(Ok(Message::Close(_))) | None => {
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(anyhow!("Socket read failed: {e}"));
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    fn on_message(&self, text: &str, result_tx: &mpsc::Sender<Envelope>) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "malformed message discarded");
                return;
            }
        };
        match envelope {
            Envelope::Dispatch { id, command } => {
                info!(command_id = %id, "command received");
                let runner = Arc::clone(&self.runner);
                let tx = result_tx.clone();
                tokio::spawn(async move {
                    let envelope = match runner.run(&command).await {
                        Ok(output) => Envelope::Result {
                            command_id: id,
                            status: ResultStatus::Success,
                            result: output,
                            error: None,
                        },
                        Err(e) => Envelope::Result {
                            command_id: id,
                            status: ResultStatus::Error,
                            result: String::new(),
                            error: Some(e),
                        },
                    };
                    if tx.send(envelope).await.is_err() {
                        // Session dropped mid-execution; the coordinator
                        // expires the command instead.
                        debug!("result discarded, session gone");
                    }
                });
            }
            Envelope::Heartbeat { .. } | Envelope::Result { .. } => {
                warn!("unexpected envelope from coordinator discarded");
            }
        }
    }
}

/// Derive the WebSocket endpoint from the HTTP base URL
fn ws_url(server_url: &str, client_id: &ClientId) -> Result<String> {
    let base = server_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(anyhow!("Server URL must start with http:// or https://"));
    };
    Ok(format!("{ws_base}/ws?client_id={client_id}"))
}
