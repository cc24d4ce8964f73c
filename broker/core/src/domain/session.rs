// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Broker Session Model
//!
//! The broker holds one long-lived session against the secret store. This
//! module models what the broker learns about that session at startup and
//! the single health bit that tracks whether it is still being renewed.
//!
//! ## Invariants
//!
//! - [`SessionConfig`] is derived once, from [`SessionIntrospection`], and
//!   never changes afterwards.
//! - [`BrokerHealth`] has exactly one writer: the [`HealthReporter`] moved
//!   into the renewal task. `HealthReporter` is not `Clone`.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

/// Metadata key overriding the issued credential TTL.
pub const META_TTL: &str = "ttl";
/// Metadata key overriding the response-wrap TTL.
pub const META_WRAP_TTL: &str = "intermediateTTL";
/// Metadata key overriding renewability (`"false"` disables it).
pub const META_RENEWABLE: &str = "renewable";

const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_WRAP_TTL: Duration = Duration::from_secs(5 * 60);

/// What the secret store reports about the broker's own session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIntrospection {
    pub renewable: bool,
    /// TTL the session was created with; also the renewal increment.
    pub creation_ttl: Duration,
    /// Remaining lifetime at introspection time.
    pub ttl: Duration,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionConfigError {
    #[error("session metadata '{key}' is not a valid duration: '{value}'")]
    InvalidDuration { key: String, value: String },
}

/// Issuance policy applied to every credential the broker mints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub ttl: Duration,
    pub renewable: bool,
    /// Lifetime of the one-time delivery wrapper.
    pub wrap_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            renewable: true,
            wrap_ttl: DEFAULT_WRAP_TTL,
        }
    }
}

impl SessionConfig {
    /// Derive issuance policy from defaults overridden by session metadata.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Result<Self, SessionConfigError> {
        let mut config = Self::default();

        if let Some(ttl) = metadata.get(META_TTL) {
            config.ttl = parse_store_duration(META_TTL, ttl)?;
        }

        if let Some(wrap_ttl) = metadata.get(META_WRAP_TTL) {
            config.wrap_ttl = parse_store_duration(META_WRAP_TTL, wrap_ttl)?;
        }

        if metadata.get(META_RENEWABLE).map(String::as_str) == Some("false") {
            config.renewable = false;
        }

        Ok(config)
    }
}

/// Parse a secret-store style duration: humantime (`5m`, `1h30m`) or bare seconds.
pub fn parse_store_duration(key: &str, value: &str) -> Result<Duration, SessionConfigError> {
    let trimmed = value.trim();
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(trimmed).map_err(|_| SessionConfigError::InvalidDuration {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Render a duration the way the secret store accepts it (`"300s"`).
pub fn format_store_duration(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

/// Read side of the broker's liveness flag.
#[derive(Debug, Clone)]
pub struct BrokerHealth {
    receiver: watch::Receiver<bool>,
}

/// Write side of the broker's liveness flag. Owned by the renewal task.
#[derive(Debug)]
pub struct HealthReporter {
    sender: watch::Sender<bool>,
}

impl BrokerHealth {
    /// Create the reader/writer pair with an initial value.
    pub fn channel(initial: bool) -> (HealthReporter, BrokerHealth) {
        let (sender, receiver) = watch::channel(initial);
        (HealthReporter { sender }, BrokerHealth { receiver })
    }

    /// Last observed renewal outcome.
    pub fn is_healthy(&self) -> bool {
        *self.receiver.borrow()
    }
}

impl HealthReporter {
    pub fn report(&self, healthy: bool) {
        // send_replace never fails, even with no readers left.
        self.sender.send_replace(healthy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_without_metadata() {
        let config = SessionConfig::from_metadata(&HashMap::new()).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert!(config.renewable);
        assert_eq!(config.wrap_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_metadata_overrides() {
        let config = SessionConfig::from_metadata(&meta(&[
            ("ttl", "1h"),
            ("intermediateTTL", "90"),
            ("renewable", "false"),
        ]))
        .unwrap();

        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(config.wrap_ttl, Duration::from_secs(90));
        assert!(!config.renewable);
    }

    #[test]
    fn test_renewable_only_disabled_by_literal_false() {
        let config = SessionConfig::from_metadata(&meta(&[("renewable", "no")])).unwrap();
        assert!(config.renewable);
    }

    #[test]
    fn test_malformed_duration_is_rejected() {
        let err = SessionConfig::from_metadata(&meta(&[("ttl", "forever")])).unwrap_err();
        assert_eq!(
            err,
            SessionConfigError::InvalidDuration {
                key: "ttl".to_string(),
                value: "forever".to_string()
            }
        );
    }

    #[test]
    fn test_format_store_duration() {
        assert_eq!(format_store_duration(Duration::from_secs(300)), "300s");
    }

    #[test]
    fn test_health_channel_reflects_latest_report() {
        let (reporter, health) = BrokerHealth::channel(true);
        let observer = health.clone();
        assert!(health.is_healthy());

        reporter.report(false);
        assert!(!health.is_healthy());
        assert!(!observer.is_healthy());

        reporter.report(true);
        assert!(observer.is_healthy());
    }
}
