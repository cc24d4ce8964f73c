// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request Verification Pipeline
//!
//! Binds an inbound create/revoke body to a registered host before the
//! session manager is touched.
//!
//! ```text
//! create:  decode → hostUUID present → signature header → isolation gate
//!          → public key lookup → signature + replay window
//! revoke:  decode → hostUUID present → signature header
//!          → public key lookup → signature + replay window
//! ```
//!
//! Steps short-circuit. Structural checks run before the directory round
//! trips, and those run before RSA verification. All authentication
//! failures collapse into one [`BrokerError::Unauthenticated`]; the precise
//! reason is only logged at debug level.

use std::sync::Arc;

use rsa::RsaPublicKey;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::application::broker_service::BrokerError;
use crate::domain::host_directory::{HostDirectory, HostDirectoryError};
use crate::domain::message::{split_policies, CreateRequest, RevokeRequest, SignedMessage};
use crate::infrastructure::signature::{self, ReplayWindow, SignatureError};

/// A create request that passed every check.
#[derive(Debug)]
pub struct VerifiedCreate {
    pub request: CreateRequest,
    pub policies: Vec<String>,
    /// Key the request was verified with; the minted secret is sealed to it.
    pub public_key: RsaPublicKey,
}

/// A revoke request that passed every check.
#[derive(Debug)]
pub struct VerifiedRevoke {
    pub request: RevokeRequest,
    pub public_key: RsaPublicKey,
}

pub struct RequestVerifier {
    directory: Arc<dyn HostDirectory>,
    window: ReplayWindow,
    require_volume_isolation: bool,
}

impl RequestVerifier {
    pub fn new(
        directory: Arc<dyn HostDirectory>,
        window: ReplayWindow,
        require_volume_isolation: bool,
    ) -> Self {
        Self {
            directory,
            window,
            require_volume_isolation,
        }
    }

    pub async fn verify_create(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<VerifiedCreate, BrokerError> {
        let request: CreateRequest = decode_body(body)?;
        require_host(&request.host_uuid)?;
        let signature = decode_signature(signature_header)?;

        if self.require_volume_isolation {
            self.check_isolation(request.volume_name.as_deref()).await?;
        }

        let public_key = self.resolve_public_key(&request.host_uuid).await?;
        let message = SignedMessage::Create(request);
        self.check_signature(&signature, &message, &public_key)?;

        let SignedMessage::Create(request) = message else {
            return Err(BrokerError::Malformed("unexpected message variant".to_string()));
        };

        debug!(host_uuid = %request.host_uuid, "Verified create request");
        Ok(VerifiedCreate {
            policies: split_policies(&request.policies),
            request,
            public_key,
        })
    }

    pub async fn verify_revoke(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<VerifiedRevoke, BrokerError> {
        let request: RevokeRequest = decode_body(body)?;
        require_host(&request.host_uuid)?;
        if request.accessor.trim().is_empty() {
            return Err(BrokerError::Malformed("accessor is required".to_string()));
        }
        let signature = decode_signature(signature_header)?;

        let public_key = self.resolve_public_key(&request.host_uuid).await?;
        let message = SignedMessage::Revoke(request);
        self.check_signature(&signature, &message, &public_key)?;

        let SignedMessage::Revoke(request) = message else {
            return Err(BrokerError::Malformed("unexpected message variant".to_string()));
        };

        debug!(host_uuid = %request.host_uuid, "Verified revoke request");
        Ok(VerifiedRevoke {
            request,
            public_key,
        })
    }

    async fn check_isolation(&self, volume_name: Option<&str>) -> Result<(), BrokerError> {
        let Some(volume_name) = volume_name.filter(|v| !v.is_empty()) else {
            debug!("Create request names no volume; isolation gate denies it");
            return Err(BrokerError::Unauthorized);
        };

        match self.directory.isolation_attribute_for(volume_name).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(volume = %volume_name, "Volume does not enable per-host isolation");
                Err(BrokerError::Unauthorized)
            }
            Err(HostDirectoryError::NotFound(_)) => {
                debug!(volume = %volume_name, "Volume template not found");
                Err(BrokerError::Unauthorized)
            }
            Err(e) => Err(BrokerError::Upstream(e.to_string())),
        }
    }

    async fn resolve_public_key(&self, host_uuid: &str) -> Result<RsaPublicKey, BrokerError> {
        let pem = match self.directory.public_key_for(host_uuid).await {
            Ok(pem) => pem,
            Err(HostDirectoryError::NotFound(_)) => {
                debug!(host_uuid = %host_uuid, "Unknown host");
                return Err(BrokerError::Unauthenticated);
            }
            Err(e) => return Err(BrokerError::Upstream(e.to_string())),
        };

        signature::load_public_key_pem(&pem).map_err(|e| {
            warn!(host_uuid = %host_uuid, error = %e, "Registered host key is unusable");
            BrokerError::Unauthenticated
        })
    }

    fn check_signature(
        &self,
        signature: &[u8],
        message: &SignedMessage,
        public_key: &RsaPublicKey,
    ) -> Result<(), BrokerError> {
        signature::verify(signature, message, public_key, &self.window).map_err(|e| {
            debug!(
                host_uuid = %message.host_uuid(),
                reason = ?e.reject_reason(),
                "Signature rejected"
            );
            BrokerError::Unauthenticated
        })
    }
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, BrokerError> {
    serde_json::from_slice(body).map_err(|e| BrokerError::Malformed(format!("invalid request body: {}", e)))
}

fn require_host(host_uuid: &str) -> Result<(), BrokerError> {
    if host_uuid.trim().is_empty() {
        return Err(BrokerError::Malformed("hostUUID is required".to_string()));
    }
    Ok(())
}

fn decode_signature(header: Option<&str>) -> Result<Vec<u8>, BrokerError> {
    let header = header.ok_or_else(|| {
        debug!("Request carries no signature header");
        BrokerError::Unauthenticated
    })?;
    signature::decode_signature(header).map_err(|e: SignatureError| {
        debug!(reason = ?e.reject_reason(), "Signature header rejected");
        BrokerError::Unauthenticated
    })
}
