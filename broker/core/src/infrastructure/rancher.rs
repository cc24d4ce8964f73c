// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Rancher host directory adapter.
//!
//! Resolves host public keys from `GET <url>/hosts?uuid=<id>` (the key lives
//! at `data[0].info.hostKey.data`) and volume isolation flags from
//! `GET <url>/volumetemplates?name=<name>` (`data[0].perContainer`).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::host_directory::{HostDirectory, HostDirectoryError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RancherHostDirectory {
    client: reqwest::Client,
    url: String,
    access_key: Option<String>,
    secret_key: Option<String>,
}

#[derive(Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct Host {
    #[serde(default)]
    info: Value,
}

#[derive(Deserialize)]
struct VolumeTemplate {
    #[serde(rename = "perContainer", default)]
    per_container: bool,
}

impl RancherHostDirectory {
    pub fn new(
        url: impl Into<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
    ) -> Result<Self, HostDirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HostDirectoryError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            access_key: access_key.filter(|k| !k.is_empty()),
            secret_key,
        })
    }

    async fn list<T: for<'de> Deserialize<'de>>(
        &self,
        collection: &str,
        filter: (&str, &str),
    ) -> Result<Vec<T>, HostDirectoryError> {
        let mut request = self
            .client
            .get(format!("{}/{}", self.url, collection))
            .query(&[filter]);

        if let Some(access_key) = &self.access_key {
            request = request.basic_auth(access_key, self.secret_key.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| HostDirectoryError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HostDirectoryError::Unavailable(format!(
                "GET {} returned HTTP {}: {}",
                collection, status, body
            )));
        }

        let collection_body: Collection<T> = response
            .json()
            .await
            .map_err(|e| HostDirectoryError::InvalidResponse(format!("{}: {}", collection, e)))?;

        Ok(collection_body.data)
    }
}

#[async_trait]
impl HostDirectory for RancherHostDirectory {
    async fn public_key_for(&self, host_uuid: &str) -> Result<String, HostDirectoryError> {
        let hosts: Vec<Host> = self.list("hosts", ("uuid", host_uuid)).await?;
        let host = hosts
            .into_iter()
            .next()
            .ok_or_else(|| HostDirectoryError::NotFound(format!("host: {}", host_uuid)))?;

        host.info
            .pointer("/hostKey/data")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HostDirectoryError::NotFound(format!("host {} has no registered key", host_uuid)))
    }

    async fn isolation_attribute_for(&self, volume_name: &str) -> Result<bool, HostDirectoryError> {
        let templates: Vec<VolumeTemplate> = self.list("volumetemplates", ("name", volume_name)).await?;
        templates
            .into_iter()
            .next()
            .map(|t| t.per_container)
            .ok_or_else(|| HostDirectoryError::NotFound(format!("volume template: {}", volume_name)))
    }
}

/// Process-local directory for tests and standalone runs.
#[derive(Default)]
pub struct InMemoryHostDirectory {
    keys: RwLock<HashMap<String, String>>,
    volumes: RwLock<HashMap<String, bool>>,
}

impl InMemoryHostDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_host(&self, host_uuid: impl Into<String>, public_key_pem: impl Into<String>) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(host_uuid.into(), public_key_pem.into());
        }
    }

    pub fn register_volume(&self, volume_name: impl Into<String>, per_host_isolation: bool) {
        if let Ok(mut volumes) = self.volumes.write() {
            volumes.insert(volume_name.into(), per_host_isolation);
        }
    }
}

#[async_trait]
impl HostDirectory for InMemoryHostDirectory {
    async fn public_key_for(&self, host_uuid: &str) -> Result<String, HostDirectoryError> {
        let keys = self
            .keys
            .read()
            .map_err(|_| HostDirectoryError::Unavailable("lock poisoned".to_string()))?;
        keys.get(host_uuid)
            .cloned()
            .ok_or_else(|| HostDirectoryError::NotFound(format!("host: {}", host_uuid)))
    }

    async fn isolation_attribute_for(&self, volume_name: &str) -> Result<bool, HostDirectoryError> {
        let volumes = self
            .volumes
            .read()
            .map_err(|_| HostDirectoryError::Unavailable("lock poisoned".to_string()))?;
        volumes
            .get(volume_name)
            .copied()
            .ok_or_else(|| HostDirectoryError::NotFound(format!("volume template: {}", volume_name)))
    }
}
