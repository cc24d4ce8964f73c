// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for the token server.
//!
//! The host private key is read from disk for every signature so that a
//! rotated key takes effect on the next call without restarting anything.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use rsa::RsaPrivateKey;
use serde::Deserialize;
use tracing::debug;

use vault_broker_core::domain::credential::EncryptedCredentialResponse;
use vault_broker_core::domain::message::{
    CreateRequest, RevokeRequest, SignedMessage, ALREADY_REVOKED_MESSAGE, SIGNATURE_HEADER,
};
use vault_broker_core::infrastructure::{envelope, signature};

use super::AgentError;

pub const DEFAULT_TOKEN_SERVER_URL: &str = "http://vault-token-server:8080/v1-vault-driver/tokens";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Decrypted credential as handed to the volume.
pub struct IssuedCredential {
    pub accessor: String,
    pub secret: String,
}

impl std::fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("accessor", &self.accessor)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    /// The server no longer knows the handle; nothing is left to revoke.
    AlreadyGone,
}

#[derive(Debug, Clone)]
pub struct TokenServerClient {
    client: Client,
    url: String,
    private_key_path: PathBuf,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl TokenServerClient {
    pub fn new(url: impl Into<String>, private_key_path: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            private_key_path: private_key_path.into(),
        })
    }

    pub fn private_key_path(&self) -> &Path {
        &self.private_key_path
    }

    fn load_key(&self) -> Result<RsaPrivateKey, AgentError> {
        let pem = std::fs::read_to_string(&self.private_key_path).map_err(|source| AgentError::KeyFile {
            path: self.private_key_path.clone(),
            source,
        })?;
        Ok(signature::load_private_key_pem(&pem)?)
    }

    /// Sign `message` with a freshly loaded key; returns the key for later decryption.
    fn sign(&self, message: &mut SignedMessage) -> Result<(RsaPrivateKey, String), AgentError> {
        let key = self.load_key()?;
        let raw = signature::sign(message, &key)?;
        Ok((key, signature::encode_signature(&raw)))
    }

    /// Request a credential for `policies` and open the returned envelope.
    pub async fn request_token(
        &self,
        policies: &str,
        host_uuid: &str,
        volume_name: Option<&str>,
    ) -> Result<IssuedCredential, AgentError> {
        let mut message = SignedMessage::Create(CreateRequest {
            policies: policies.to_string(),
            host_uuid: host_uuid.to_string(),
            timestamp: String::new(),
            volume_name: volume_name.map(str::to_string),
        });
        let (key, header) = self.sign(&mut message)?;

        let response = self
            .client
            .post(&self.url)
            .header(SIGNATURE_HEADER, header)
            .json(&message)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(rejection(response).await);
        }

        let body: EncryptedCredentialResponse = response
            .json()
            .await
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;

        let plaintext = envelope::decrypt_with(&key, &body.encrypted_token)?;
        let secret = String::from_utf8(plaintext)
            .map_err(|_| AgentError::InvalidResponse("decrypted token is not UTF-8".to_string()))?;

        debug!(accessor = %body.accessor, "Received credential");
        Ok(IssuedCredential {
            accessor: body.accessor,
            secret,
        })
    }

    /// Ask the server to revoke `accessor`.
    ///
    /// A 400 means the handle is already gone only when the server says so,
    /// or sends no readable error body at all. Any other 400 is a rejection.
    pub async fn revoke_token(&self, accessor: &str, host_uuid: &str) -> Result<RevokeOutcome, AgentError> {
        let mut message = SignedMessage::Revoke(RevokeRequest {
            accessor: accessor.to_string(),
            host_uuid: host_uuid.to_string(),
            timestamp: String::new(),
        });
        let (_, header) = self.sign(&mut message)?;

        let response = self
            .client
            .delete(&self.url)
            .header(SIGNATURE_HEADER, header)
            .json(&message)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::ACCEPTED => Ok(RevokeOutcome::Revoked),
            StatusCode::BAD_REQUEST => {
                let text = response.text().await.unwrap_or_default();
                match error_message(&text) {
                    Some(message) if message != ALREADY_REVOKED_MESSAGE => Err(AgentError::Rejected {
                        status: StatusCode::BAD_REQUEST.as_u16(),
                        message,
                    }),
                    _ => {
                        debug!(accessor = %accessor, "Token server reports the credential as already gone");
                        Ok(RevokeOutcome::AlreadyGone)
                    }
                }
            }
            _ => Err(rejection(response).await),
        }
    }
}

/// The `message` field of a JSON error body, if there is a non-empty one.
fn error_message(text: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(text)
        .ok()
        .map(|b| b.message)
        .filter(|m| !m.is_empty())
}

async fn rejection(response: reqwest::Response) -> AgentError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = error_message(&text).unwrap_or(text);
    AgentError::Rejected { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rand_core::OsRng;
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::pkcs8::LineEnding;
    use serde_json::json;
    use std::sync::OnceLock;
    use tempfile::TempDir;

    fn host_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 1024).unwrap())
    }

    fn write_key(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("host.key");
        let pem = host_key().to_pkcs1_pem(LineEnding::LF).unwrap();
        std::fs::write(&path, pem.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_request_token_signs_and_decrypts() {
        let dir = TempDir::new().unwrap();
        let key_path = write_key(&dir);
        let sealed = envelope::encrypt_for(&host_key().to_public_key(), b"s.secret").unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1-vault-driver/tokens")
            .match_header("x-vault-driver-signature", Matcher::Regex("^[A-Za-z0-9+/=]+$".into()))
            .match_body(Matcher::PartialJson(json!({
                "policies": "read-secrets",
                "hostUUID": "h1",
                "volumeName": "v1"
            })))
            .with_status(200)
            .with_body(json!({ "accessor": "acc-123", "encryptedToken": sealed }).to_string())
            .create_async()
            .await;

        let client = TokenServerClient::new(format!("{}/v1-vault-driver/tokens", server.url()), key_path).unwrap();
        let issued = client.request_token("read-secrets", "h1", Some("v1")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(issued.accessor, "acc-123");
        assert_eq!(issued.secret, "s.secret");
    }

    #[tokio::test]
    async fn test_request_token_surfaces_server_message() {
        let dir = TempDir::new().unwrap();
        let key_path = write_key(&dir);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(400)
            .with_body(r#"{"type":"error","status":"400","message":"signature invalid"}"#)
            .create_async()
            .await;

        let client = TokenServerClient::new(server.url() + "/", key_path).unwrap();
        let err = client.request_token("p", "h1", None).await.unwrap_err();
        match err {
            AgentError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "signature invalid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_revoke_outcomes() {
        let dir = TempDir::new().unwrap();
        let key_path = write_key(&dir);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/")
            .match_body(Matcher::PartialJson(json!({ "accessor": "acc-live" })))
            .with_status(202)
            .create_async()
            .await;
        server
            .mock("DELETE", "/")
            .match_body(Matcher::PartialJson(json!({ "accessor": "acc-gone" })))
            .with_status(400)
            .with_body(json!({ "type": "error", "status": "400", "message": ALREADY_REVOKED_MESSAGE }).to_string())
            .create_async()
            .await;
        server
            .mock("DELETE", "/")
            .match_body(Matcher::PartialJson(json!({ "accessor": "acc-bare" })))
            .with_status(400)
            .create_async()
            .await;
        server
            .mock("DELETE", "/")
            .match_body(Matcher::PartialJson(json!({ "accessor": "acc-500" })))
            .with_status(500)
            .create_async()
            .await;

        let client = TokenServerClient::new(server.url() + "/", key_path).unwrap();
        assert_eq!(client.revoke_token("acc-live", "h1").await.unwrap(), RevokeOutcome::Revoked);
        assert_eq!(client.revoke_token("acc-gone", "h1").await.unwrap(), RevokeOutcome::AlreadyGone);
        assert_eq!(client.revoke_token("acc-bare", "h1").await.unwrap(), RevokeOutcome::AlreadyGone);
        assert!(matches!(
            client.revoke_token("acc-500", "h1").await,
            Err(AgentError::Rejected { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_revoke_signature_failure_is_not_already_gone() {
        let dir = TempDir::new().unwrap();
        let key_path = write_key(&dir);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/")
            .with_status(400)
            .with_body(r#"{"type":"error","status":"400","message":"signature invalid"}"#)
            .create_async()
            .await;

        let client = TokenServerClient::new(server.url() + "/", key_path).unwrap();
        match client.revoke_token("acc-live", "h1").await {
            Err(AgentError::Rejected { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "signature invalid");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_key_file_fails_before_network() {
        let client = TokenServerClient::new("http://127.0.0.1:1/", "/nonexistent/host.key").unwrap();
        let result = client.revoke_token("acc", "h1").await;
        assert!(matches!(result, Err(AgentError::KeyFile { .. })));
    }
}
