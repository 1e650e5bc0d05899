//! HTTP and WebSocket endpoints
//!
//! Three surfaces share one router: a public registration endpoint gated
//! by single-use tokens, operator endpoints gated by the configured
//! operator key, and the agent WebSocket upgrade gated by signed
//! credentials. Credential checks happen before the upgrade so a bad
//! agent never gets a socket.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use drover_core::auth::{constant_time_eq, CredentialVerifier};
use drover_core::error::DroverError;
use drover_core::time::current_time_secs;
use drover_core::{AgentRecord, ClientId, CommandRecord};

use crate::session;
use crate::state::CoordinatorState;

/// Build the coordinator router
pub fn router(state: Arc<CoordinatorState>) -> Router {
    let operator = Router::new()
        .route("/clients", get(list_clients))
        .route("/command", post(submit_command))
        .route("/commands/:client_id", get(list_commands))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_operator,
        ));

    Router::new()
        .route("/register", post(register_agent))
        .route("/ws", get(ws_upgrade))
        .merge(operator)
        .with_state(state)
}

/// Uniform JSON error body with an HTTP status
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<DroverError> for ApiError {
    fn from(e: DroverError) -> Self {
        warn!(error = %e, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Gate for operator endpoints. An empty configured key refuses every
/// request; operator access must be configured deliberately.
async fn require_operator(
    State(state): State<Arc<CoordinatorState>>,
    request: Request,
    next: Next,
) -> Response {
    let configured = &state.config.operator_key;
    if configured.is_empty() {
        return ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "operator access not configured",
        )
        .into_response();
    }
    match bearer_token(request.headers()) {
        Some(presented) if constant_time_eq(presented, configured) => {
            next.run(request).await
        }
        _ => ApiError::unauthorized("invalid operator key").into_response(),
    }
}

#[derive(Deserialize)]
struct RegisterRequest {
    token: String,
    hostname: String,
    #[serde(default)]
    ip: Option<String>,
}

#[derive(Serialize)]
struct RegisterResponse {
    client_id: String,
    credential: String,
}

async fn register_agent(
    State(state): State<Arc<CoordinatorState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let consumed = state
        .tokens
        .consume_token(&request.token, current_time_secs())
        .await
        .map_err(DroverError::from)?;
    if !consumed {
        return Err(ApiError::unauthorized("invalid or expired registration token"));
    }

    let client_id = ClientId::generate();
    let ip = request.ip.unwrap_or_else(|| addr.ip().to_string());
    state
        .agents
        .insert_agent(AgentRecord::new(client_id.clone(), request.hostname, ip))
        .await
        .map_err(DroverError::from)?;
    let credential = state.credentials.issue(&client_id);
    info!(client_id = %client_id, "agent registered");

    Ok(Json(RegisterResponse {
        client_id: client_id.to_string(),
        credential,
    }))
}

async fn list_clients(
    State(state): State<Arc<CoordinatorState>>,
) -> Result<Json<Vec<AgentRecord>>, ApiError> {
    let agents = state.agents.list_agents().await.map_err(DroverError::from)?;
    Ok(Json(agents))
}

#[derive(Deserialize)]
struct CommandRequest {
    client_id: String,
    command: String,
}

async fn submit_command(
    State(state): State<Arc<CoordinatorState>>,
    Json(request): Json<CommandRequest>,
) -> Result<(StatusCode, Json<CommandRecord>), ApiError> {
    if request.command.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "empty command"));
    }
    let client_id = ClientId::new(request.client_id);
    if state
        .agents
        .agent(&client_id)
        .await
        .map_err(DroverError::from)?
        .is_none()
    {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "unknown client"));
    }

    let record = state.dispatcher.submit(client_id, request.command).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

async fn list_commands(
    State(state): State<Arc<CoordinatorState>>,
    Path(client_id): Path<String>,
) -> Result<Json<Vec<CommandRecord>>, ApiError> {
    let client_id = ClientId::new(client_id);
    if state
        .agents
        .agent(&client_id)
        .await
        .map_err(DroverError::from)?
        .is_none()
    {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "unknown client"));
    }
    let history = state.dispatcher.history(&client_id).await?;
    Ok(Json(history))
}

#[derive(Deserialize)]
struct WsQuery {
    client_id: String,
}

async fn ws_upgrade(
    State(state): State<Arc<CoordinatorState>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let Some(credential) = bearer_token(&headers) else {
        return Err(ApiError::unauthorized("missing credential"));
    };
    let Some(verified) = state.credentials.verify(credential) else {
        return Err(ApiError::unauthorized("invalid credential"));
    };
    if verified.as_str() != query.client_id {
        return Err(ApiError::unauthorized("credential does not match client"));
    }
    if state
        .agents
        .agent(&verified)
        .await
        .map_err(DroverError::from)?
        .is_none()
    {
        return Err(ApiError::unauthorized("unknown client"));
    }

    Ok(ws.on_upgrade(move |socket| session::run(state, socket, verified)))
}
