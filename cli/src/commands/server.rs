// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Token server command

use anyhow::Result;
use clap::Args;

use vault_broker_core::domain::broker_config::BrokerConfigManifest;

use crate::daemon;

#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// HTTP listen port (overrides spec.network.port)
    #[arg(long, env = "VAULT_BROKER_PORT")]
    pub port: Option<u16>,
}

pub async fn run(args: ServerArgs, config: BrokerConfigManifest) -> Result<()> {
    daemon::start_server(config, args.port).await
}
