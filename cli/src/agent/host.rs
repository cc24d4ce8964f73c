// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Host identity resolution.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::AgentError;

pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.250/2016-07-29";

#[derive(Deserialize)]
struct SelfHost {
    #[serde(default)]
    uuid: String,
}

/// Use `explicit` when given, otherwise ask the metadata service for this host's UUID.
pub async fn resolve_host_uuid(explicit: Option<&str>, metadata_url: &str) -> Result<String, AgentError> {
    if let Some(uuid) = explicit.map(str::trim).filter(|u| !u.is_empty()) {
        return Ok(uuid.to_string());
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| AgentError::HostIdentity(e.to_string()))?;

    let url = format!("{}/self/host", metadata_url.trim_end_matches('/'));
    debug!(url = %url, "Resolving host identity from metadata service");

    let response = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| AgentError::HostIdentity(format!("metadata service unreachable: {}", e)))?;

    if !response.status().is_success() {
        return Err(AgentError::HostIdentity(format!(
            "metadata service returned HTTP {}",
            response.status()
        )));
    }

    let host: SelfHost = response
        .json()
        .await
        .map_err(|e| AgentError::HostIdentity(format!("invalid metadata response: {}", e)))?;

    if host.uuid.is_empty() {
        return Err(AgentError::HostIdentity("metadata service returned no uuid".to_string()));
    }
    Ok(host.uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_uuid_skips_metadata() {
        let uuid = resolve_host_uuid(Some(" h1 "), "http://127.0.0.1:1").await.unwrap();
        assert_eq!(uuid, "h1");
    }

    #[tokio::test]
    async fn test_uuid_from_metadata_service() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/2016-07-29/self/host")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_body(r#"{"name":"node-1","uuid":"h1","hostname":"node-1"}"#)
            .create_async()
            .await;

        let uuid = resolve_host_uuid(None, &format!("{}/2016-07-29", server.url()))
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(uuid, "h1");
    }

    #[tokio::test]
    async fn test_metadata_without_uuid_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/self/host")
            .with_status(200)
            .with_body(r#"{"name":"node-1"}"#)
            .create_async()
            .await;

        let result = resolve_host_uuid(Some(""), &server.url()).await;
        assert!(matches!(result, Err(AgentError::HostIdentity(_))));
    }
}
