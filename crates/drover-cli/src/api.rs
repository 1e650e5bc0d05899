//! Operator HTTP client

use anyhow::{bail, Context, Result};
use serde::Serialize;

use drover_core::{AgentRecord, CommandRecord};

/// Client for the coordinator's operator endpoints
pub struct ApiClient {
    base_url: String,
    operator_key: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, operator_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            operator_key: operator_key.into(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn list_clients(&self) -> Result<Vec<AgentRecord>> {
        let response = self
            .http
            .get(format!("{}/clients", self.base_url))
            .bearer_auth(&self.operator_key)
            .send()
            .await
            .context("Failed to reach coordinator")?;
        Self::parse(response).await
    }

    pub async fn send_command(&self, client_id: &str, command: &str) -> Result<CommandRecord> {
        #[derive(Serialize)]
        struct CommandRequest<'a> {
            client_id: &'a str,
            command: &'a str,
        }

        let response = self
            .http
            .post(format!("{}/command", self.base_url))
            .bearer_auth(&self.operator_key)
            .json(&CommandRequest { client_id, command })
            .send()
            .await
            .context("Failed to reach coordinator")?;
        Self::parse(response).await
    }

    pub async fn get_commands(&self, client_id: &str) -> Result<Vec<CommandRecord>> {
        let response = self
            .http
            .get(format!("{}/commands/{}", self.base_url, client_id))
            .bearer_auth(&self.operator_key)
            .send()
            .await
            .context("Failed to reach coordinator")?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Coordinator returned {status}: {body}");
        }
        response
            .json()
            .await
            .context("Malformed coordinator response")
    }
}
