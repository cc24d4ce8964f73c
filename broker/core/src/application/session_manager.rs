// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Session Manager
//!
//! Owns the broker's long-lived session against the secret store.
//!
//! ```text
//! start ──► introspect ──► renewable? ──► SessionConfig ──► creation_ttl > 300s?
//!                                                              │
//!                          renew once (seeds health) ◄─────────┘
//!                                   │
//!                                   ▼
//!                    SessionRenewer task: every 300s renew_self(creation_ttl)
//!                    ok → healthy, err → unhealthy + warn, loop continues
//! ```
//!
//! Any failure before the renewer is spawned is fatal: the process must not
//! start serving. After that, renewal failures only flip [`BrokerHealth`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::credential::Credential;
use crate::domain::secret_store::{SecretStore, SecretStoreError, WrappedCredentialRequest};
use crate::domain::session::{BrokerHealth, HealthReporter, SessionConfig, SessionConfigError};

/// Fixed period of the self-renewal loop.
pub const RENEWAL_INTERVAL: Duration = Duration::from_secs(300);

/// Sessions created with a TTL at or below this cannot survive one missed renewal.
pub const MIN_SESSION_TTL: Duration = RENEWAL_INTERVAL;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("issuing token is not renewable")]
    NotRenewable,

    #[error("token ttl needs to be greater than {} seconds (got {} seconds); 1-12 hours is recommended", MIN_SESSION_TTL.as_secs(), .0.as_secs())]
    TtlTooShort(Duration),

    #[error("invalid session metadata: {0}")]
    Config(#[from] SessionConfigError),

    #[error("secret store error: {0}")]
    Store(#[from] SecretStoreError),
}

/// Performs one renewal and records the outcome. Sole owner of the health writer.
pub struct SessionRenewer {
    store: Arc<dyn SecretStore>,
    increment: Duration,
    reporter: HealthReporter,
}

impl SessionRenewer {
    pub fn new(store: Arc<dyn SecretStore>, increment: Duration, reporter: HealthReporter) -> Self {
        Self {
            store,
            increment,
            reporter,
        }
    }

    /// Renew the session once. Returns the outcome that was reported.
    pub async fn renew_once(&self) -> bool {
        debug!(increment_secs = self.increment.as_secs(), "Renewing broker session");
        match self.store.renew_self(self.increment).await {
            Ok(()) => {
                self.reporter.report(true);
                true
            }
            Err(e) => {
                warn!(error = %e, "Could not renew broker session");
                self.reporter.report(false);
                false
            }
        }
    }

    async fn run(self, shutdown_token: CancellationToken) {
        info!(
            interval_seconds = RENEWAL_INTERVAL.as_secs(),
            increment_seconds = self.increment.as_secs(),
            "Starting session renewal background task"
        );

        let mut tick = interval_at(Instant::now() + RENEWAL_INTERVAL, RENEWAL_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.renew_once().await;
                }
                _ = shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping session renewal");
                    break;
                }
            }
        }

        info!("Session renewal background task stopped");
    }
}

/// Serving-phase handle over the broker session: mint, revoke, health.
pub struct SessionManager {
    store: Arc<dyn SecretStore>,
    role: String,
    config: SessionConfig,
    health: BrokerHealth,
    shutdown_token: CancellationToken,
    renewal_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Introspect the session, derive issuance policy, renew once and spawn the renewer.
    pub async fn start(store: Arc<dyn SecretStore>, role: impl Into<String>) -> Result<Self, SessionError> {
        let role = role.into();

        let introspection = store.introspect_self().await?;
        if !introspection.renewable {
            return Err(SessionError::NotRenewable);
        }

        let config = SessionConfig::from_metadata(&introspection.metadata)?;
        debug!(
            ttl_secs = config.ttl.as_secs(),
            wrap_ttl_secs = config.wrap_ttl.as_secs(),
            renewable = config.renewable,
            "Derived issuance policy from session metadata"
        );

        if introspection.creation_ttl <= MIN_SESSION_TTL {
            return Err(SessionError::TtlTooShort(introspection.creation_ttl));
        }

        let (reporter, health) = BrokerHealth::channel(false);
        let renewer = SessionRenewer::new(store.clone(), introspection.creation_ttl, reporter);
        if !renewer.renew_once().await {
            error!("Initial session renewal failed; serving as unhealthy until the next cycle");
        }

        let shutdown_token = CancellationToken::new();
        let renewal_task = tokio::spawn(renewer.run(shutdown_token.clone()));

        info!(
            role = %role,
            creation_ttl_secs = introspection.creation_ttl.as_secs(),
            remaining_ttl_secs = introspection.ttl.as_secs(),
            "Broker session established"
        );

        Ok(Self {
            store,
            role,
            config,
            health,
            shutdown_token,
            renewal_task: Mutex::new(Some(renewal_task)),
        })
    }

    /// Mint a scoped credential under the configured role and issuance policy.
    pub async fn mint(&self, policies: Vec<String>) -> Result<Credential, SecretStoreError> {
        let request = WrappedCredentialRequest {
            policies,
            ttl: self.config.ttl,
            renewable: self.config.renewable,
            wrap_ttl: self.config.wrap_ttl,
            role: self.role.clone(),
        };
        self.store.create_wrapped(&request).await
    }

    /// Revoke a credential by handle. Repeated revokes are the store's concern.
    pub async fn revoke(&self, accessor: &str) -> Result<(), SecretStoreError> {
        self.store.revoke_accessor(accessor).await
    }

    pub fn healthy(&self) -> bool {
        self.health.is_healthy()
    }

    /// Health reader for callers that outlive a borrow of the manager.
    pub fn health(&self) -> BrokerHealth {
        self.health.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stop the renewal task and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let handle = self.renewal_task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Session renewal task ended abnormally");
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
