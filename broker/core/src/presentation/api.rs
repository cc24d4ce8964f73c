// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP surface of the broker.
//!
//! | Method   | Path                       | Success                              |
//! |----------|----------------------------|--------------------------------------|
//! | `POST`   | `/v1-vault-driver/tokens`  | 200 `{accessor, encryptedToken}`     |
//! | `DELETE` | `/v1-vault-driver/tokens`  | 202                                  |
//! | `GET`    | `/health`                  | 200 healthy, 500 renewal failing     |
//!
//! Bodies are taken as raw bytes so that JSON errors surface as
//! [`BrokerError::Malformed`] rather than axum's own rejection.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::warn;

use crate::application::broker_service::{BrokerError, BrokerService};
use crate::domain::message::SIGNATURE_HEADER;

pub const TOKENS_PATH: &str = "/v1-vault-driver/tokens";
pub const HEALTH_PATH: &str = "/health";

pub struct AppState {
    pub broker: Arc<BrokerService>,
}

pub fn app(broker: Arc<BrokerService>) -> Router {
    let state = Arc::new(AppState { broker });

    Router::new()
        .route(TOKENS_PATH, post(create_token).delete(revoke_token))
        .route(HEALTH_PATH, get(health))
        .with_state(state)
}

fn signature_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok())
}

async fn create_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, BrokerError> {
    let response = state
        .broker
        .create_token(&body, signature_header(&headers))
        .await?;
    Ok((StatusCode::OK, Json(response)))
}

async fn revoke_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, BrokerError> {
    state
        .broker
        .revoke_token(&body, signature_header(&headers))
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    if state.broker.health() {
        (StatusCode::OK, Json(json!({ "status": "healthy" }))).into_response()
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "unhealthy",
                "message": "vault token refresh is failing"
            })),
        )
            .into_response()
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Upstream detail stays in the logs.
        let message = if status.is_server_error() {
            warn!(error = %self, "Request failed on an upstream call");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "type": "error",
            "status": status.as_u16().to_string(),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: BrokerError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_client_error_shape() {
        let (status, body) = render(BrokerError::Unauthorized).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "type": "error",
                "status": "400",
                "message": "per-host isolation not enabled for this volume"
            })
        );
    }

    #[tokio::test]
    async fn test_server_error_hides_detail() {
        let (status, body) = render(BrokerError::Upstream("vault at 10.0.0.5 sealed".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "500");
        assert!(!body["message"].as_str().unwrap().contains("10.0.0.5"));
    }
}
