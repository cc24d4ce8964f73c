// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Host Directory Boundary
//!
//! Read-only lookups against the external host registry: the public key a
//! host registered, and whether a volume has per-host isolation enabled.
//! No caching happens here; every request pays one registry round trip.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostDirectoryError {
    #[error("not found in host directory: {0}")]
    NotFound(String),

    #[error("host directory unavailable: {0}")]
    Unavailable(String),

    #[error("invalid response from host directory: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait HostDirectory: Send + Sync {
    /// PEM-encoded RSA public key registered for `host_uuid`.
    async fn public_key_for(&self, host_uuid: &str) -> Result<String, HostDirectoryError>;

    /// Per-host isolation flag of the named volume.
    async fn isolation_attribute_for(&self, volume_name: &str) -> Result<bool, HostDirectoryError>;
}
