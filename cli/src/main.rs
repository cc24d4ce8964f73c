// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # vault-broker
//!
//! One binary for both ends of the secret delivery protocol.
//!
//! ## Commands
//!
//! - `vault-broker server` - Run the token server in front of Vault
//! - `vault-broker volume attach|detach` - Host agent operations for a volume
//! - `vault-broker config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use vault_broker::commands::{self, AgentOptions, ConfigCommand, ServerArgs, VolumeCommand};
use vault_broker_core::domain::broker_config::BrokerConfigManifest;

/// Vault token broker - deliver per-volume Vault credentials to hosts
#[derive(Parser)]
#[command(name = "vault-broker")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "VAULT_BROKER_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "VAULT_BROKER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, env = "VAULT_BROKER_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the token server
    #[command(name = "server")]
    Server(ServerArgs),

    /// Volume agent operations
    #[command(name = "volume")]
    Volume {
        #[command(flatten)]
        options: AgentOptions,

        #[command(subcommand)]
        command: VolumeCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let config = BrokerConfigManifest::load_or_default(cli.config)
                .context("Failed to load configuration")?;

            let logging = &config.spec.observability.logging;
            let level = cli.log_level.unwrap_or_else(|| logging.level.clone());
            let format = cli.log_format.unwrap_or(if logging.format == "json" {
                LogFormat::Json
            } else {
                LogFormat::Text
            });
            init_logging(&level, format)?;

            commands::server::run(args, config).await
        }
        Commands::Volume { options, command } => {
            init_logging(
                cli.log_level.as_deref().unwrap_or("warn"),
                cli.log_format.unwrap_or(LogFormat::Text),
            )?;

            let status = commands::volume::handle_command(command, options).await;
            println!(
                "{}",
                serde_json::to_string(&status).context("Failed to encode driver status")?
            );
            if !status.is_success() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Config { command } => {
            init_logging(
                cli.log_level.as_deref().unwrap_or("warn"),
                cli.log_format.unwrap_or(LogFormat::Text),
            )?;
            commands::config::handle_command(command, cli.config).await
        }
    }
}

/// Initialize tracing subscriber for logging.
///
/// Logs go to stderr; stdout is reserved for command output.
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.compact().init(),
    }

    Ok(())
}
