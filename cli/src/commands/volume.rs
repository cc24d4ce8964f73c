// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume agent commands
//!
//! Commands: attach, detach
//!
//! Output is a single JSON status object on stdout so a volume driver can
//! call the binary directly.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;
use tracing::error;

use crate::agent::client::DEFAULT_TOKEN_SERVER_URL;
use crate::agent::host::DEFAULT_METADATA_URL;
use crate::agent::volume::DEFAULT_VOLUME_ROOT;
use crate::agent::{resolve_host_uuid, AgentError, DetachOutcome, TokenServerClient, VolumeAgent};

pub const DEFAULT_PRIVATE_KEY_PATH: &str = "/var/lib/rancher/etc/ssl/host.key";

#[derive(Subcommand, Debug)]
pub enum VolumeCommand {
    /// Obtain a credential and store it in the volume directory
    Attach {
        /// Volume name
        #[arg(long)]
        name: String,

        /// Comma-separated policy list for the credential
        #[arg(long)]
        policies: String,
    },

    /// Revoke the volume's credential and remove its directory
    Detach {
        /// Volume name
        #[arg(long)]
        name: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AgentOptions {
    /// Token server endpoint
    #[arg(long, env = "VAULT_TOKEN_SERVER_URL", default_value = DEFAULT_TOKEN_SERVER_URL)]
    pub token_server_url: String,

    /// Host private key (PEM)
    #[arg(long, env = "HOST_PRIVATE_KEY_PATH", default_value = DEFAULT_PRIVATE_KEY_PATH)]
    pub private_key: PathBuf,

    /// Directory holding per-volume credential directories
    #[arg(long, env = "VAULT_VOLUME_ROOT", default_value = DEFAULT_VOLUME_ROOT)]
    pub volume_root: PathBuf,

    /// Host UUID (default: ask the metadata service)
    #[arg(long, env = "HOST_UUID")]
    pub host_uuid: Option<String>,

    /// Metadata service base URL
    #[arg(long, env = "RANCHER_METADATA_URL", default_value = DEFAULT_METADATA_URL)]
    pub metadata_url: String,
}

/// Driver call result in the FlexVolume status format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverStatus {
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessor: Option<String>,
}

impl DriverStatus {
    pub fn success() -> Self {
        Self {
            status: "Success",
            message: None,
            device: None,
            accessor: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: "Failure",
            message: Some(message.into()),
            device: None,
            accessor: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "Success"
    }
}

pub async fn handle_command(command: VolumeCommand, options: AgentOptions) -> DriverStatus {
    match run(command, options).await {
        Ok(status) => status,
        Err(e) => {
            error!(error = %e, "Volume operation failed");
            DriverStatus::failure(e.to_string())
        }
    }
}

async fn run(command: VolumeCommand, options: AgentOptions) -> Result<DriverStatus, AgentError> {
    let host_uuid = resolve_host_uuid(options.host_uuid.as_deref(), &options.metadata_url).await?;
    let client = TokenServerClient::new(options.token_server_url, options.private_key)?;
    let agent = VolumeAgent::new(client, options.volume_root, host_uuid);

    match command {
        VolumeCommand::Attach { name, policies } => {
            let attached = agent.attach(&name, &policies).await?;
            Ok(DriverStatus {
                device: Some(attached.path.display().to_string()),
                accessor: Some(attached.accessor),
                ..DriverStatus::success()
            })
        }
        VolumeCommand::Detach { name } => {
            let message = match agent.detach(&name).await? {
                DetachOutcome::Revoked => "credential revoked",
                DetachOutcome::AlreadyGone => "credential already revoked",
                DetachOutcome::NothingToRevoke => "no credential stored",
            };
            Ok(DriverStatus {
                message: Some(message.to_string()),
                ..DriverStatus::success()
            })
        }
    }
}
