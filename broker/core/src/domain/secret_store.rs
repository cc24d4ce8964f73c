// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Secret Store Boundary
//!
//! Anti-corruption layer over the external secret store. The broker only
//! needs four operations from it; everything else about the store (storage
//! engine, policy definitions, auth backends) stays on the far side of this
//! trait. The production adapter lives in [`crate::infrastructure::vault`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::credential::Credential;
use crate::domain::session::SessionIntrospection;

#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// The handle is unknown to the store: never issued, expired or already revoked.
    #[error("credential handle not found: {0}")]
    NotFound(String),

    #[error("secret store rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("secret store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid response from secret store: {0}")]
    InvalidResponse(String),
}

/// Parameters for one scoped, response-wrapped credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedCredentialRequest {
    pub policies: Vec<String>,
    pub ttl: Duration,
    pub renewable: bool,
    pub wrap_ttl: Duration,
    pub role: String,
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Look up the broker's own session.
    async fn introspect_self(&self) -> Result<SessionIntrospection, SecretStoreError>;

    /// Extend the broker's own session by `increment`.
    async fn renew_self(&self, increment: Duration) -> Result<(), SecretStoreError>;

    /// Mint a new scoped credential delivered inside a one-time wrapper.
    async fn create_wrapped(
        &self,
        request: &WrappedCredentialRequest,
    ) -> Result<Credential, SecretStoreError>;

    /// Invalidate a credential by its handle.
    async fn revoke_accessor(&self, accessor: &str) -> Result<(), SecretStoreError>;
}
