//! One-time registration with the coordinator

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use drover_core::ClientId;

#[derive(Serialize)]
struct RegisterRequest<'a> {
    token: &'a str,
    hostname: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse {
    client_id: String,
    credential: String,
}

/// Exchange a single-use registration token for an identity and a signed
/// credential. Called once; the result is persisted in the agent config.
pub async fn register(
    server_url: &str,
    token: &str,
    hostname: &str,
) -> Result<(ClientId, String)> {
    let url = format!("{}/register", server_url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .json(&RegisterRequest { token, hostname })
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Registration rejected ({status}): {body}");
    }

    let body: RegisterResponse = response
        .json()
        .await
        .context("Malformed registration response")?;
    info!(client_id = %body.client_id, "registered with coordinator");
    Ok((ClientId::new(body.client_id), body.credential))
}
