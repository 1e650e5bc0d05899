//! WebSocket session lifecycle
//!
//! One task pair per connected agent: a writer that drains the outbound
//! queue onto the socket, and a reader that applies heartbeats and results.
//! Both halves select on the session's cancellation token, so the
//! heartbeat monitor and reconnect displacement tear a session down
//! through the same path as a normal disconnect.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::StreamExt;
use futures::SinkExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use drover_core::time::current_time_secs;
use drover_core::{AgentStatus, ClientId};
use drover_protocol::Envelope;

use crate::registry::SessionHandle;
use crate::state::CoordinatorState;

/// Drive a freshly upgraded agent socket until it closes
pub async fn run(state: Arc<CoordinatorState>, socket: WebSocket, client_id: ClientId) {
    let (outbound_tx, outbound_rx) = mpsc::channel(state.config.outbound_queue_depth);
    let (handle, displaced) = state.registry.register(client_id.clone(), outbound_tx);
    if let Some(old) = displaced {
        info!(client_id = %client_id, "new session displaces previous one");
        old.close();
    }

    if let Err(e) = state
        .agents
        .update_agent_status(&client_id, AgentStatus::Connected, current_time_secs())
        .await
    {
        warn!(client_id = %client_id, error = %e, "failed to mark agent connected");
    }
    info!(client_id = %client_id, "agent session established");

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_outbound(sink, outbound_rx, Arc::clone(&handle)));

    // Backlog accumulated while the agent was offline goes out first
    if let Err(e) = state.dispatcher.flush_pending(&client_id).await {
        warn!(client_id = %client_id, error = %e, "backlog flush failed");
    }

    read_inbound(&state, stream, &handle).await;

    // Reader is done; tear down the writer and deregister. The agent only
    // flips to disconnected if this session is still the registered one.
    handle.close();
    let _ = writer.await;
    if state.registry.remove(&handle) {
        if let Err(e) = state
            .agents
            .update_agent_status(&client_id, AgentStatus::Disconnected, current_time_secs())
            .await
        {
            warn!(client_id = %client_id, error = %e, "failed to mark agent disconnected");
        }
        info!(client_id = %client_id, "agent session closed");
    } else {
        debug!(client_id = %client_id, "displaced session closed");
    }
}

async fn write_outbound(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Envelope>,
    handle: Arc<SessionHandle>,
) {
    loop {
        tokio::select! {
            maybe = outbound.recv() => {
                let Some(envelope) = maybe else { break };
                let text = match envelope.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(client_id = %handle.client_id(), error = %e, "dropping unencodable envelope");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!(client_id = %handle.client_id(), error = %e, "outbound send failed");
                    handle.close();
                    break;
                }
            }
            _ = handle.cancel_token().cancelled() => break,
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

async fn read_inbound(
    state: &CoordinatorState,
    mut stream: futures::stream::SplitStream<WebSocket>,
    handle: &SessionHandle,
) {
    let client_id = handle.client_id().clone();
    loop {
        let message = tokio::select! {
            maybe = stream.next() => match maybe {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    debug!(client_id = %client_id, error = %e, "socket read error");
                    return;
                }
                None => return,
            },
            _ = handle.cancel_token().cancelled() => return,
            // Daemon shutdown closes every live session
            _ = state.shutdown.cancelled() => return,
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => return,
            // Pings are answered at the protocol level
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Binary(_) => {
                warn!(client_id = %client_id, "binary frame discarded");
                continue;
            }
        };

        // A malformed message is the sender's problem, not the session's
        let envelope = match Envelope::decode(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "malformed message discarded");
                continue;
            }
        };

        match envelope {
            Envelope::Heartbeat {
                client_id: reported,
                ..
            } => {
                if reported != client_id.as_str() {
                    warn!(
                        client_id = %client_id,
                        reported = %reported,
                        "heartbeat with mismatched client id discarded"
                    );
                    continue;
                }
                handle.record_heartbeat();
                if let Err(e) = state
                    .agents
                    .update_agent_status(&client_id, AgentStatus::Connected, current_time_secs())
                    .await
                {
                    warn!(client_id = %client_id, error = %e, "heartbeat status update failed");
                }
            }
            Envelope::Result {
                command_id,
                status,
                result,
                error,
            } => {
                if let Err(e) = state
                    .dispatcher
                    .on_result(&client_id, &command_id, status, result, error)
                    .await
                {
                    warn!(client_id = %client_id, error = %e, "result handling failed");
                }
            }
            Envelope::Dispatch { .. } => {
                warn!(client_id = %client_id, "dispatch envelope from agent discarded");
            }
        }
    }
}
