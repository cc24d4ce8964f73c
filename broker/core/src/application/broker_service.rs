// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Broker Service
//!
//! Composes verification, issuance and the hybrid envelope behind the two
//! token operations and the liveness probe.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Request-scoped orchestration; owns no mutable state

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::application::session_manager::SessionManager;
use crate::application::verification::RequestVerifier;
use crate::domain::credential::EncryptedCredentialResponse;
use crate::domain::message::ALREADY_REVOKED_MESSAGE;
use crate::domain::secret_store::SecretStoreError;
use crate::infrastructure::envelope;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("signature invalid")]
    Unauthenticated,

    #[error("per-host isolation not enabled for this volume")]
    Unauthorized,

    #[error("{}", ALREADY_REVOKED_MESSAGE)]
    AlreadyRevoked,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Malformed(_) | Self::Unauthenticated | Self::Unauthorized | Self::AlreadyRevoked => 400,
            Self::Upstream(_) | Self::Internal(_) => 500,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Unauthenticated => "unauthenticated",
            Self::Unauthorized => "unauthorized",
            Self::AlreadyRevoked => "already_revoked",
            Self::Upstream(_) => "upstream",
            Self::Internal(_) => "internal",
        }
    }
}

pub struct BrokerService {
    verifier: RequestVerifier,
    sessions: Arc<SessionManager>,
}

impl BrokerService {
    pub fn new(verifier: RequestVerifier, sessions: Arc<SessionManager>) -> Self {
        Self { verifier, sessions }
    }

    /// Verify a create request, mint a credential and seal it to the requesting host.
    pub async fn create_token(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<EncryptedCredentialResponse, BrokerError> {
        let verified = self
            .verifier
            .verify_create(body, signature)
            .await
            .inspect_err(|e| record_rejection("create", e))?;

        let credential = self.sessions.mint(verified.policies).await.map_err(|e| {
            error!(host_uuid = %verified.request.host_uuid, error = %e, "Failed to mint credential");
            let err = BrokerError::Upstream(e.to_string());
            record_rejection("create", &err);
            err
        })?;

        let encrypted_token = match envelope::encrypt_for(&verified.public_key, credential.secret.as_bytes()) {
            Ok(token) => token,
            Err(e) => {
                error!(accessor = %credential.accessor, error = %e, "Failed to seal credential; revoking it");
                if let Err(revoke_err) = self.sessions.revoke(&credential.accessor).await {
                    error!(accessor = %credential.accessor, error = %revoke_err, "Revoking unsealed credential failed");
                }
                let err = BrokerError::Internal(e.to_string());
                record_rejection("create", &err);
                return Err(err);
            }
        };

        counter!("vault_broker_tokens_issued_total").increment(1);
        debug!(
            accessor = %credential.accessor,
            host_uuid = %verified.request.host_uuid,
            "Sending wrapped credential"
        );

        Ok(EncryptedCredentialResponse {
            accessor: credential.accessor,
            encrypted_token,
        })
    }

    /// Verify a revoke request and revoke the named credential.
    pub async fn revoke_token(&self, body: &[u8], signature: Option<&str>) -> Result<(), BrokerError> {
        let verified = self
            .verifier
            .verify_revoke(body, signature)
            .await
            .inspect_err(|e| record_rejection("revoke", e))?;
        let accessor = verified.request.accessor;

        match self.sessions.revoke(&accessor).await {
            Ok(()) => {
                counter!("vault_broker_tokens_revoked_total").increment(1);
                info!(host_uuid = %verified.request.host_uuid, "Revoked credential");
                debug!(accessor = %accessor, "Revoked credential handle");
                Ok(())
            }
            Err(SecretStoreError::NotFound(_)) => {
                debug!(accessor = %accessor, "Credential already gone");
                let err = BrokerError::AlreadyRevoked;
                record_rejection("revoke", &err);
                Err(err)
            }
            Err(e) => {
                error!(accessor = %accessor, error = %e, "Failed to revoke credential");
                let err = BrokerError::Upstream(e.to_string());
                record_rejection("revoke", &err);
                Err(err)
            }
        }
    }

    /// Last observed renewal outcome.
    pub fn health(&self) -> bool {
        self.sessions.healthy()
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }
}

fn record_rejection(operation: &'static str, err: &BrokerError) {
    counter!(
        "vault_broker_requests_rejected_total",
        "operation" => operation,
        "reason" => err.kind()
    )
    .increment(1);
}
