// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Vault Secret Store Adapter
//!
//! Anti-corruption layer mapping [`SecretStore`] onto the Vault token auth
//! backend HTTP API.
//!
//! | Operation          | Request                                        |
//! |--------------------|------------------------------------------------|
//! | `introspect_self`  | `GET  /v1/auth/token/lookup-self`              |
//! | `renew_self`       | `POST /v1/auth/token/renew-self`               |
//! | `create_wrapped`   | `POST /v1/auth/token/create/<role>` + wrap TTL |
//! | `revoke_accessor`  | `POST /v1/auth/token/revoke-accessor`          |
//!
//! Create responses are read from `wrap_info`: the returned secret is the
//! single-use wrapping token, the handle is the wrapped credential's
//! accessor (falling back to the wrapper's own accessor).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::credential::Credential;
use crate::domain::secret_store::{SecretStore, SecretStoreError, WrappedCredentialRequest};
use crate::domain::session::{format_store_duration, SessionIntrospection};

const TOKEN_HEADER: &str = "X-Vault-Token";
const WRAP_TTL_HEADER: &str = "X-Vault-Wrap-TTL";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct VaultSecretStore {
    client: reqwest::Client,
    address: String,
    token: String,
}

#[derive(Deserialize)]
struct LookupSelfResponse {
    data: LookupSelfData,
}

#[derive(Deserialize)]
struct LookupSelfData {
    #[serde(default)]
    renewable: bool,
    #[serde(default)]
    creation_ttl: u64,
    #[serde(default)]
    ttl: u64,
    #[serde(default)]
    meta: Option<HashMap<String, String>>,
}

#[derive(Serialize)]
struct RenewSelfBody {
    increment: String,
}

#[derive(Serialize)]
struct CreateTokenBody<'a> {
    policies: &'a [String],
    ttl: String,
    renewable: bool,
}

#[derive(Deserialize)]
struct WrappedResponse {
    wrap_info: Option<WrapInfo>,
}

#[derive(Deserialize)]
struct WrapInfo {
    token: String,
    #[serde(default)]
    accessor: String,
    #[serde(default)]
    wrapped_accessor: Option<String>,
}

#[derive(Serialize)]
struct RevokeAccessorBody<'a> {
    accessor: &'a str,
}

#[derive(Deserialize, Default)]
struct VaultErrors {
    #[serde(default)]
    errors: Vec<String>,
}

impl VaultSecretStore {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Result<Self, SecretStoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SecretStoreError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            address: address.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, SecretStoreError> {
        request
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| SecretStoreError::Unavailable(e.to_string()))
    }

    async fn rejection(response: reqwest::Response) -> SecretStoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<VaultErrors>(&body)
            .ok()
            .filter(|e| !e.errors.is_empty())
            .map(|e| e.errors.join("; "))
            .unwrap_or(body);
        SecretStoreError::Rejected { status, message }
    }
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn introspect_self(&self) -> Result<SessionIntrospection, SecretStoreError> {
        let response = self
            .send(self.client.get(self.url("auth/token/lookup-self")))
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let lookup: LookupSelfResponse = response
            .json()
            .await
            .map_err(|e| SecretStoreError::InvalidResponse(format!("lookup-self: {}", e)))?;

        Ok(SessionIntrospection {
            renewable: lookup.data.renewable,
            creation_ttl: Duration::from_secs(lookup.data.creation_ttl),
            ttl: Duration::from_secs(lookup.data.ttl),
            metadata: lookup.data.meta.unwrap_or_default(),
        })
    }

    async fn renew_self(&self, increment: Duration) -> Result<(), SecretStoreError> {
        let body = RenewSelfBody {
            increment: format_store_duration(increment),
        };
        let response = self
            .send(self.client.post(self.url("auth/token/renew-self")).json(&body))
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(())
    }

    async fn create_wrapped(
        &self,
        request: &WrappedCredentialRequest,
    ) -> Result<Credential, SecretStoreError> {
        let body = CreateTokenBody {
            policies: &request.policies,
            ttl: format_store_duration(request.ttl),
            renewable: request.renewable,
        };
        let url = self.url(&format!("auth/token/create/{}", request.role));

        let response = self
            .send(
                self.client
                    .post(&url)
                    .header(WRAP_TTL_HEADER, format_store_duration(request.wrap_ttl))
                    .json(&body),
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let wrapped: WrappedResponse = response
            .json()
            .await
            .map_err(|e| SecretStoreError::InvalidResponse(format!("token create: {}", e)))?;

        let info = wrapped.wrap_info.ok_or_else(|| {
            SecretStoreError::InvalidResponse("token create response has no wrap_info".to_string())
        })?;

        let accessor = info
            .wrapped_accessor
            .filter(|a| !a.is_empty())
            .unwrap_or(info.accessor);
        if accessor.is_empty() {
            return Err(SecretStoreError::InvalidResponse(
                "wrap_info carries no accessor".to_string(),
            ));
        }

        debug!(accessor = %accessor, role = %request.role, "Minted wrapped credential");
        Ok(Credential::new(accessor, info.token))
    }

    async fn revoke_accessor(&self, accessor: &str) -> Result<(), SecretStoreError> {
        let response = self
            .send(
                self.client
                    .post(self.url("auth/token/revoke-accessor"))
                    .json(&RevokeAccessorBody { accessor }),
            )
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                Err(SecretStoreError::NotFound(accessor.to_string()))
            }
            _ => Err(Self::rejection(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_introspect_self_reads_lookup() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/auth/token/lookup-self")
            .match_header("x-vault-token", "root-token")
            .with_status(200)
            .with_body(
                json!({
                    "data": {
                        "renewable": true,
                        "creation_ttl": 3600,
                        "ttl": 3200,
                        "meta": { "ttl": "10m" }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let store = VaultSecretStore::new(server.url(), "root-token").unwrap();
        let session = store.introspect_self().await.unwrap();

        mock.assert_async().await;
        assert!(session.renewable);
        assert_eq!(session.creation_ttl, Duration::from_secs(3600));
        assert_eq!(session.ttl, Duration::from_secs(3200));
        assert_eq!(session.metadata.get("ttl").map(String::as_str), Some("10m"));
    }

    #[tokio::test]
    async fn test_introspect_self_null_meta() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/auth/token/lookup-self")
            .with_status(200)
            .with_body(r#"{"data":{"renewable":false,"creation_ttl":0,"ttl":0,"meta":null}}"#)
            .create_async()
            .await;

        let store = VaultSecretStore::new(server.url(), "t").unwrap();
        let session = store.introspect_self().await.unwrap();
        assert!(!session.renewable);
        assert!(session.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_renew_self_sends_increment() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/auth/token/renew-self")
            .match_body(Matcher::Json(json!({ "increment": "3600s" })))
            .with_status(200)
            .with_body(r#"{"auth":{}}"#)
            .create_async()
            .await;

        let store = VaultSecretStore::new(server.url(), "t").unwrap();
        store.renew_self(Duration::from_secs(3600)).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_renew_self_failure_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/auth/token/renew-self")
            .with_status(403)
            .with_body(r#"{"errors":["permission denied"]}"#)
            .create_async()
            .await;

        let store = VaultSecretStore::new(server.url(), "t").unwrap();
        let err = store.renew_self(Duration::from_secs(60)).await.unwrap_err();
        match err {
            SecretStoreError::Rejected { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "permission denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_wrapped_prefers_wrapped_accessor() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/auth/token/create/volume-role")
            .match_header("x-vault-wrap-ttl", "120s")
            .match_body(Matcher::Json(json!({
                "policies": ["read-secrets", "audit"],
                "ttl": "300s",
                "renewable": true
            })))
            .with_status(200)
            .with_body(
                json!({
                    "wrap_info": {
                        "token": "s.wrapping",
                        "accessor": "wrapper-acc",
                        "ttl": 120,
                        "wrapped_accessor": "acc-123"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let store = VaultSecretStore::new(server.url(), "t").unwrap();
        let credential = store
            .create_wrapped(&WrappedCredentialRequest {
                policies: vec!["read-secrets".to_string(), "audit".to_string()],
                ttl: Duration::from_secs(300),
                renewable: true,
                wrap_ttl: Duration::from_secs(120),
                role: "volume-role".to_string(),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(credential.accessor, "acc-123");
        assert_eq!(credential.secret, "s.wrapping");
    }

    #[tokio::test]
    async fn test_create_wrapped_without_wrap_info_is_invalid() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/auth/token/create/r")
            .with_status(200)
            .with_body(r#"{"auth":{"client_token":"s.plain"}}"#)
            .create_async()
            .await;

        let store = VaultSecretStore::new(server.url(), "t").unwrap();
        let result = store
            .create_wrapped(&WrappedCredentialRequest {
                policies: vec![],
                ttl: Duration::from_secs(300),
                renewable: true,
                wrap_ttl: Duration::from_secs(300),
                role: "r".to_string(),
            })
            .await;
        assert!(matches!(result, Err(SecretStoreError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_revoke_accessor_outcomes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/auth/token/revoke-accessor")
            .match_body(Matcher::Json(json!({ "accessor": "acc-live" })))
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("POST", "/v1/auth/token/revoke-accessor")
            .match_body(Matcher::Json(json!({ "accessor": "acc-gone" })))
            .with_status(400)
            .with_body(r#"{"errors":["invalid accessor"]}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/v1/auth/token/revoke-accessor")
            .match_body(Matcher::Json(json!({ "accessor": "acc-broken" })))
            .with_status(503)
            .with_body(r#"{"errors":["Vault is sealed"]}"#)
            .create_async()
            .await;

        let store = VaultSecretStore::new(server.url(), "t").unwrap();
        assert!(store.revoke_accessor("acc-live").await.is_ok());
        assert!(matches!(
            store.revoke_accessor("acc-gone").await,
            Err(SecretStoreError::NotFound(a)) if a == "acc-gone"
        ));
        assert!(matches!(
            store.revoke_accessor("acc-broken").await,
            Err(SecretStoreError::Rejected { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unavailable() {
        let store = VaultSecretStore::new("http://127.0.0.1:1", "t").unwrap();
        let result = store.introspect_self().await;
        assert!(matches!(result, Err(SecretStoreError::Unavailable(_))));
    }
}
