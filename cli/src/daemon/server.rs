// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Broker HTTP server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use vault_broker_core::{
    application::{BrokerService, RequestVerifier, SessionManager},
    domain::broker_config::{resolve_secret, BrokerConfigManifest},
    infrastructure::{signature::ReplayWindow, RancherHostDirectory, VaultSecretStore},
    presentation::api,
};

use super::shutdown_signal;

/// Everything the broker process serves, assembled from configuration.
pub struct BrokerRuntime {
    pub router: Router,
    pub sessions: Arc<SessionManager>,
    pub listen_addr: String,
}

impl BrokerRuntime {
    /// Validate configuration, connect adapters and establish the Vault session.
    ///
    /// Fails without serving anything when the session cannot be established.
    pub async fn build(config: &BrokerConfigManifest, port_override: Option<u16>) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        let spec = &config.spec;

        let vault_token = config
            .vault_token()
            .context("Vault token is not set")?;
        let store = Arc::new(
            VaultSecretStore::new(&spec.vault.address, vault_token)
                .context("Failed to create Vault client")?,
        );

        let directory = Arc::new(
            RancherHostDirectory::new(
                &spec.directory.url,
                spec.directory.access_key.as_deref().and_then(resolve_secret),
                config.directory_secret_key(),
            )
            .context("Failed to create Rancher client")?,
        );

        let sessions = Arc::new(
            SessionManager::start(store, &spec.vault.role)
                .await
                .context("Failed to establish Vault session")?,
        );

        let window = ReplayWindow::new(
            spec.verification.replay_window,
            spec.verification.max_future_skew,
        );
        let verifier = RequestVerifier::new(directory, window, spec.verification.require_volume_isolation);
        let broker = Arc::new(BrokerService::new(verifier, sessions.clone()));

        let router = api::app(broker).layer(TraceLayer::new_for_http());
        let port = port_override.unwrap_or(spec.network.port);

        Ok(Self {
            router,
            sessions,
            listen_addr: format!("{}:{}", spec.network.bind_address, port),
        })
    }
}

pub async fn start_server(config: BrokerConfigManifest, port_override: Option<u16>) -> Result<()> {
    info!(name = %config.metadata.name, "Vault broker starting (PID: {})", std::process::id());

    let runtime = BrokerRuntime::build(&config, port_override).await?;

    if config.spec.observability.metrics.enabled {
        install_metrics_exporter(&config.spec.network.bind_address, config.spec.observability.metrics.port)?;
    }

    let listener = TcpListener::bind(&runtime.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", runtime.listen_addr))?;

    info!("Starting server on: {}", runtime.listen_addr);

    let served = axum::serve(listener, runtime.router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    runtime.sessions.shutdown().await;
    info!("Vault broker shut down");

    served
}

fn install_metrics_exporter(bind_address: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .with_context(|| format!("Invalid metrics listen address {}:{}", bind_address, port))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    metrics::describe_counter!("vault_broker_tokens_issued_total", "Credentials minted and delivered");
    metrics::describe_counter!("vault_broker_tokens_revoked_total", "Credentials revoked on request");
    metrics::describe_counter!("vault_broker_requests_rejected_total", "Token requests that failed, by operation and reason");

    if bind_address == "0.0.0.0" {
        warn!("Metrics endpoint is exposed on all interfaces");
    }
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}
