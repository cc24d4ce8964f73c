// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Broker Configuration Types
//
// Defines the configuration schema for a broker process, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Secret store address, role and admin credential
// - Host directory (registry) endpoint and credentials
// - Request verification policy (replay window, isolation gate)
// - Network and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const API_VERSION: &str = "vault-broker/v1";
pub const KIND: &str = "BrokerConfig";

/// Top-level Kubernetes-style broker configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfigManifest {
    /// API version (must be "vault-broker/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "BrokerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: BrokerConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable broker name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfigSpec {
    #[serde(default)]
    pub vault: VaultConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Secret store base URL (e.g., "https://vault.internal:8200")
    #[serde(default)]
    pub address: String,

    /// Token role used for every credential the broker issues
    #[serde(default)]
    pub role: String,

    /// Admin credential for the broker's own session (supports "env:VAR_NAME")
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Host registry API base URL
    #[serde(default)]
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,

    /// Supports "env:VAR_NAME"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Maximum accepted age of a request timestamp
    #[serde(default = "default_replay_window", with = "humantime_serde")]
    pub replay_window: Duration,

    /// How far ahead of the broker clock a request timestamp may be
    #[serde(default = "default_max_future_skew", with = "humantime_serde")]
    pub max_future_skew: Duration,

    /// Require the target volume to have per-host isolation enabled before issuing
    #[serde(default = "default_true")]
    pub require_volume_isolation: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus exporter port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Fatal configuration problem, named after the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid Config: {field} is not set correctly.")]
pub struct ConfigError {
    pub field: String,
}

impl ConfigError {
    fn field(field: &str) -> Self {
        Self {
            field: field.to_string(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_replay_window() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_max_future_skew() -> Duration {
    Duration::from_secs(30)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            replay_window: default_replay_window(),
            max_future_skew: default_max_future_skew(),
            require_volume_isolation: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for BrokerConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "vault-token-server".to_string(),
                labels: None,
            },
            spec: BrokerConfigSpec::default(),
        }
    }
}

/// Resolve "env:VAR_NAME" indirection; other values are returned as-is.
pub fn resolve_secret(value: &str) -> Option<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var).ok().filter(|v| !v.is_empty()),
        None => Some(value.to_string()),
    }
}

impl BrokerConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. VAULT_BROKER_CONFIG_PATH environment variable
    /// 2. ./vault-broker.yaml (working directory)
    /// 3. ~/.vault-broker/config.yaml (user home)
    /// 4. /etc/vault-broker/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("VAULT_BROKER_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./vault-broker.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".vault-broker").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/vault-broker/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using environment and defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    /// This allows container deployments to configure the broker entirely via env vars
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(val) = lookup("VAULT_ADDR") {
            tracing::info!("Environment override: VAULT_ADDR={}", val);
            self.spec.vault.address = val;
        }
        if let Some(val) = lookup("VAULT_ROLE") {
            tracing::info!("Environment override: VAULT_ROLE={}", val);
            self.spec.vault.role = val;
        }
        if let Some(val) = lookup("VAULT_TOKEN") {
            tracing::info!("Environment override: VAULT_TOKEN=<redacted>");
            self.spec.vault.token = val;
        }
        if let Some(val) = lookup("CATTLE_URL") {
            tracing::info!("Environment override: CATTLE_URL={}", val);
            self.spec.directory.url = val;
        }
        if let Some(val) = lookup("CATTLE_ACCESS_KEY") {
            self.spec.directory.access_key = Some(val);
        }
        if let Some(val) = lookup("CATTLE_SECRET_KEY") {
            self.spec.directory.secret_key = Some(val);
        }
    }

    /// Admin token with "env:" indirection resolved.
    pub fn vault_token(&self) -> Option<String> {
        resolve_secret(&self.spec.vault.token).filter(|t| !t.is_empty())
    }

    /// Directory secret key with "env:" indirection resolved.
    pub fn directory_secret_key(&self) -> Option<String> {
        self.spec
            .directory
            .secret_key
            .as_deref()
            .and_then(resolve_secret)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::field("apiVersion"));
        }

        if self.kind != KIND {
            return Err(ConfigError::field("kind"));
        }

        if self.spec.vault.role.is_empty() {
            return Err(ConfigError::field("VaultRole"));
        }

        if self.vault_token().is_none() {
            return Err(ConfigError::field("VaultToken"));
        }

        if self.spec.vault.address.is_empty() {
            return Err(ConfigError::field("VaultURL"));
        }

        if self.spec.directory.url.is_empty() {
            return Err(ConfigError::field("RancherURL"));
        }

        if self.spec.verification.replay_window.is_zero() {
            return Err(ConfigError::field("ReplayWindow"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_manifest() -> BrokerConfigManifest {
        let mut manifest = BrokerConfigManifest::default();
        manifest.spec.vault.address = "http://vault:8200".to_string();
        manifest.spec.vault.role = "vault-volume".to_string();
        manifest.spec.vault.token = "s.admin".to_string();
        manifest.spec.directory.url = "http://rancher:8080/v2-beta".to_string();
        manifest
    }

    #[test]
    fn test_default_manifest() {
        let manifest = BrokerConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert_eq!(manifest.spec.network.port, 8080);
        assert_eq!(manifest.spec.verification.replay_window, Duration::from_secs(300));
        assert!(manifest.spec.verification.require_volume_isolation);
    }

    #[test]
    fn test_yaml_parsing_with_durations() {
        let yaml = r#"
apiVersion: vault-broker/v1
kind: BrokerConfig
metadata:
  name: broker-a
spec:
  vault:
    address: http://vault:8200
    role: vault-volume
    token: s.admin
  directory:
    url: http://rancher:8080/v2-beta
    access_key: ak
    secret_key: sk
  verification:
    replay_window: 2m
    max_future_skew: 5s
    require_volume_isolation: false
"#;
        let manifest = BrokerConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "broker-a");
        assert_eq!(manifest.spec.verification.replay_window, Duration::from_secs(120));
        assert_eq!(manifest.spec.verification.max_future_skew, Duration::from_secs(5));
        assert!(!manifest.spec.verification.require_volume_isolation);
        assert_eq!(manifest.spec.network.port, 8080);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validation_names_missing_field() {
        assert!(valid_manifest().validate().is_ok());

        let mut manifest = valid_manifest();
        manifest.spec.vault.role.clear();
        assert_eq!(manifest.validate().unwrap_err().field, "VaultRole");

        let mut manifest = valid_manifest();
        manifest.spec.vault.token.clear();
        assert_eq!(manifest.validate().unwrap_err().field, "VaultToken");

        let mut manifest = valid_manifest();
        manifest.spec.vault.address.clear();
        assert_eq!(manifest.validate().unwrap_err().field, "VaultURL");

        let mut manifest = valid_manifest();
        manifest.spec.directory.url.clear();
        let err = manifest.validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid Config: RancherURL is not set correctly.");

        let mut manifest = valid_manifest();
        manifest.kind = "WrongKind".to_string();
        assert_eq!(manifest.validate().unwrap_err().field, "kind");
    }

    #[test]
    fn test_config_error_converts_into_anyhow() {
        let err: anyhow::Error = ConfigError::field("VaultRole").into();
        assert_eq!(err.to_string(), "Invalid Config: VaultRole is not set correctly.");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_env_indirection_for_token() {
        let mut manifest = valid_manifest();
        manifest.spec.vault.token = "env:VAULT_BROKER_TEST_TOKEN_THAT_IS_NOT_SET".to_string();
        assert!(manifest.vault_token().is_none());
        assert_eq!(manifest.validate().unwrap_err().field, "VaultToken");
    }

    #[test]
    fn test_overrides_replace_configured_values() {
        let mut manifest = valid_manifest();
        let env: HashMap<&str, &str> = HashMap::from([
            ("VAULT_ADDR", "http://other-vault:8200"),
            ("VAULT_TOKEN", "s.override"),
            ("CATTLE_ACCESS_KEY", "ak"),
            ("VAULT_ROLE", ""),
        ]);
        manifest.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(manifest.spec.vault.address, "http://other-vault:8200");
        assert_eq!(manifest.vault_token().as_deref(), Some("s.override"));
        assert_eq!(manifest.spec.directory.access_key.as_deref(), Some("ak"));
        // Empty values do not clobber configured ones.
        assert_eq!(manifest.spec.vault.role, "vault-volume");
    }
}
