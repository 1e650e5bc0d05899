//! End-to-end coordinator tests over real sockets

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use drover_core::auth::MacCredentials;
use drover_core::config::CoordinatorConfig;
use drover_core::store::{AgentStore, CommandStore, MemoryStore, RegistrationToken, TokenStore};
use drover_core::time::current_time_secs;
use drover_coordinator::{http, CoordinatorState};

const OPERATOR_KEY: &str = "test-operator-key";

struct TestServer {
    addr: SocketAddr,
    state: Arc<CoordinatorState>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(config: CoordinatorConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let credentials = MacCredentials::new(config.credential_secret.clone());
        let state = Arc::new(CoordinatorState::new(
            config,
            Arc::clone(&store) as Arc<dyn AgentStore>,
            Arc::clone(&store) as Arc<dyn CommandStore>,
            Arc::clone(&store) as Arc<dyn TokenStore>,
            credentials,
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = http::router(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            addr,
            state,
            client: reqwest::Client::new(),
        }
    }

    fn config() -> CoordinatorConfig {
        CoordinatorConfig {
            operator_key: OPERATOR_KEY.to_string(),
            credential_secret: "integration-test-secret".to_string(),
            ..Default::default()
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn issue_token(&self) -> String {
        let token = format!("token-{}", uuid_like());
        self.state
            .tokens
            .issue_token(RegistrationToken {
                token: token.clone(),
                expires_at: current_time_secs() + 3600,
            })
            .await
            .unwrap();
        token
    }

    /// Register an agent, returning (client_id, credential)
    async fn register(&self) -> (String, String) {
        let token = self.issue_token().await;
        let response = self
            .client
            .post(self.url("/register"))
            .json(&json!({ "token": token, "hostname": "test-host" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        (
            body["client_id"].as_str().unwrap().to_string(),
            body["credential"].as_str().unwrap().to_string(),
        )
    }

    async fn connect_ws(
        &self,
        client_id: &str,
        credential: &str,
    ) -> tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    > {
        let url = format!("ws://{}/ws?client_id={}", self.addr, client_id);
        let mut request = url.into_client_request().unwrap();
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {credential}").parse().unwrap(),
        );
        let (ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();
        ws
    }

    async fn submit(&self, client_id: &str, command: &str) -> Value {
        let response = self
            .client
            .post(self.url("/command"))
            .bearer_auth(OPERATOR_KEY)
            .json(&json!({ "client_id": client_id, "command": command }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 202);
        response.json().await.unwrap()
    }

    async fn commands(&self, client_id: &str) -> Vec<Value> {
        let response = self
            .client
            .get(self.url(&format!("/commands/{client_id}")))
            .bearer_auth(OPERATOR_KEY)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }

    /// Poll until the agent shows the wanted status. Session registration
    /// runs after the upgrade response, so tests wait for it explicitly.
    async fn await_agent_status(&self, client_id: &str, wanted: &str) {
        for _ in 0..50 {
            let response = self
                .client
                .get(self.url("/clients"))
                .bearer_auth(OPERATOR_KEY)
                .send()
                .await
                .unwrap();
            let agents: Vec<Value> = response.json().await.unwrap();
            if agents
                .iter()
                .any(|a| a["id"] == client_id && a["status"] == wanted)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("agent {client_id} never reached status {wanted}");
    }

    /// Poll until the command reaches the wanted status
    async fn await_status(&self, client_id: &str, command_id: &str, wanted: &str) -> Value {
        for _ in 0..50 {
            let commands = self.commands(client_id).await;
            if let Some(found) = commands
                .iter()
                .find(|c| c["id"] == command_id && c["status"] == wanted)
            {
                return found.clone();
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("command {command_id} never reached status {wanted}");
    }
}

fn uuid_like() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| format!("{:x}", rng.gen_range(0..16)))
        .collect()
}

async fn next_text(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> String {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            return text;
        }
    }
}

#[tokio::test]
async fn test_full_command_round_trip() {
    let server = TestServer::start(TestServer::config()).await;
    let (client_id, credential) = server.register().await;
    let mut ws = server.connect_ws(&client_id, &credential).await;

    // Heartbeat marks the agent connected
    let heartbeat = json!({
        "type": "heartbeat",
        "client_id": client_id,
        "timestamp": current_time_secs(),
    });
    ws.send(Message::Text(heartbeat.to_string())).await.unwrap();
    server.await_agent_status(&client_id, "connected").await;

    let submitted = server.submit(&client_id, "uptime").await;
    let command_id = submitted["id"].as_str().unwrap().to_string();
    assert_eq!(submitted["status"], "executing");

    // The dispatch envelope has no type field, just id and command
    let dispatched: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    assert_eq!(dispatched["id"], command_id.as_str());
    assert_eq!(dispatched["command"], "uptime");
    assert!(dispatched.get("type").is_none());

    let result = json!({
        "command_id": command_id,
        "status": "success",
        "result": "up 3 days",
    });
    ws.send(Message::Text(result.to_string())).await.unwrap();

    let finished = server
        .await_status(&client_id, &command_id, "completed")
        .await;
    assert_eq!(finished["result"], "up 3 days");
}

#[tokio::test]
async fn test_offline_backlog_flushes_on_connect() {
    let server = TestServer::start(TestServer::config()).await;
    let (client_id, credential) = server.register().await;

    let first = server.submit(&client_id, "echo one").await;
    let second = server.submit(&client_id, "echo two").await;
    assert_eq!(first["status"], "pending");
    assert_eq!(second["status"], "pending");

    // Backlog arrives in submission order once the agent connects
    let mut ws = server.connect_ws(&client_id, &credential).await;
    let d1: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    let d2: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    assert_eq!(d1["command"], "echo one");
    assert_eq!(d2["command"], "echo two");

    server
        .await_status(&client_id, first["id"].as_str().unwrap(), "executing")
        .await;
    server
        .await_status(&client_id, second["id"].as_str().unwrap(), "executing")
        .await;
}

#[tokio::test]
async fn test_duplicate_result_keeps_first_outcome() {
    let server = TestServer::start(TestServer::config()).await;
    let (client_id, credential) = server.register().await;
    let mut ws = server.connect_ws(&client_id, &credential).await;
    server.await_agent_status(&client_id, "connected").await;

    let submitted = server.submit(&client_id, "whoami").await;
    let command_id = submitted["id"].as_str().unwrap().to_string();
    next_text(&mut ws).await;

    let first = json!({
        "command_id": command_id,
        "status": "success",
        "result": "root",
    });
    ws.send(Message::Text(first.to_string())).await.unwrap();
    server
        .await_status(&client_id, &command_id, "completed")
        .await;

    let late = json!({
        "command_id": command_id,
        "status": "error",
        "result": "",
        "error": "spurious retry",
    });
    ws.send(Message::Text(late.to_string())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let finished = server
        .await_status(&client_id, &command_id, "completed")
        .await;
    assert_eq!(finished["result"], "root");
    assert!(finished.get("error").is_none());
}

#[tokio::test]
async fn test_malformed_message_does_not_close_session() {
    let server = TestServer::start(TestServer::config()).await;
    let (client_id, credential) = server.register().await;
    let mut ws = server.connect_ws(&client_id, &credential).await;
    server.await_agent_status(&client_id, "connected").await;

    ws.send(Message::Text("{not json".to_string())).await.unwrap();
    ws.send(Message::Text(json!({"shape": "unknown"}).to_string()))
        .await
        .unwrap();

    // Session must still dispatch after the garbage
    let submitted = server.submit(&client_id, "date").await;
    let dispatched: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    assert_eq!(dispatched["id"], submitted["id"]);
}

#[tokio::test]
async fn test_ws_rejects_bad_credential() {
    let server = TestServer::start(TestServer::config()).await;
    let (client_id, _credential) = server.register().await;

    let url = format!("ws://{}/ws?client_id={}", server.addr, client_id);
    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Authorization", "Bearer forged.0.deadbeef".parse().unwrap());
    let err = tokio_tungstenite::connect_async(request).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ws_rejects_credential_for_other_client() {
    let server = TestServer::start(TestServer::config()).await;
    let (_first_id, first_credential) = server.register().await;
    let (second_id, _second_credential) = server.register().await;

    let url = format!("ws://{}/ws?client_id={}", server.addr, second_id);
    let mut request = url.into_client_request().unwrap();
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {first_credential}").parse().unwrap(),
    );
    let err = tokio_tungstenite::connect_async(request).await.unwrap_err();
    assert!(matches!(
        err,
        tokio_tungstenite::tungstenite::Error::Http(_)
    ));
}

#[tokio::test]
async fn test_registration_token_is_single_use() {
    let server = TestServer::start(TestServer::config()).await;
    let token = server.issue_token().await;

    let first = server
        .client
        .post(server.url("/register"))
        .json(&json!({ "token": token, "hostname": "host-a" }))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let replay = server
        .client
        .post(server.url("/register"))
        .json(&json!({ "token": token, "hostname": "host-b" }))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), 401);
}

#[tokio::test]
async fn test_operator_endpoints_require_key() {
    let server = TestServer::start(TestServer::config()).await;

    let no_key = server
        .client
        .get(server.url("/clients"))
        .send()
        .await
        .unwrap();
    assert_eq!(no_key.status(), 401);

    let wrong_key = server
        .client
        .get(server.url("/clients"))
        .bearer_auth("not-the-key")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_key.status(), 401);

    let right_key = server
        .client
        .get(server.url("/clients"))
        .bearer_auth(OPERATOR_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(right_key.status(), 200);
}

#[tokio::test]
async fn test_unconfigured_operator_key_refuses_everything() {
    let config = CoordinatorConfig {
        operator_key: String::new(),
        credential_secret: "integration-test-secret".to_string(),
        ..Default::default()
    };
    let server = TestServer::start(config).await;

    let response = server
        .client
        .get(server.url("/clients"))
        .bearer_auth("")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn test_command_for_unknown_client_is_404() {
    let server = TestServer::start(TestServer::config()).await;

    let response = server
        .client
        .post(server.url("/command"))
        .bearer_auth(OPERATOR_KEY)
        .json(&json!({ "client_id": "no-such-agent", "command": "id" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_reconnect_displaces_previous_session() {
    let server = TestServer::start(TestServer::config()).await;
    let (client_id, credential) = server.register().await;

    let mut first = server.connect_ws(&client_id, &credential).await;
    let mut second = server.connect_ws(&client_id, &credential).await;

    // The first session is closed by the coordinator
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(message)) = first.next().await {
            if matches!(message, Message::Close(_)) {
                return true;
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(closed);

    // Dispatch goes to the replacement
    let submitted = server.submit(&client_id, "hostname").await;
    let dispatched: Value = serde_json::from_str(&next_text(&mut second).await).unwrap();
    assert_eq!(dispatched["id"], submitted["id"]);
}

#[tokio::test]
async fn test_silent_session_is_evicted() {
    let config = CoordinatorConfig {
        heartbeat_timeout: Duration::from_millis(200),
        heartbeat_sweep_interval: Duration::from_millis(100),
        ..TestServer::config()
    };
    let server = TestServer::start(config).await;

    let monitor = drover_coordinator::monitor::HeartbeatMonitor::new(
        server.state.config.heartbeat_sweep_interval,
        server.state.config.heartbeat_timeout,
    );
    let cancel = server.state.shutdown.clone();
    tokio::spawn(monitor.run(Arc::clone(&server.state.registry), cancel));

    let (client_id, credential) = server.register().await;
    let mut ws = server.connect_ws(&client_id, &credential).await;

    // No heartbeats; the monitor closes the session
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return true,
            }
        }
    })
    .await
    .unwrap();
    assert!(closed);

    server.await_agent_status(&client_id, "disconnected").await;
}
