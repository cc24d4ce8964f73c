// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use vault_broker_core::domain::broker_config::BrokerConfigManifest;

const SAMPLE_CONFIG: &str = include_str!("../../templates/vault-broker.yaml");

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./vault-broker.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

fn redact(value: Option<&str>) -> String {
    match value {
        Some(v) if v.starts_with("env:") => v.to_string(),
        Some(v) if !v.is_empty() => "<redacted>".to_string(),
        _ => "(not set)".to_string(),
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = BrokerConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. VAULT_BROKER_CONFIG_PATH: {}",
            std::env::var("VAULT_BROKER_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./vault-broker.yaml");
        println!("  4. ~/.vault-broker/config.yaml");
        println!("  5. /etc/vault-broker/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{} {}", "Current configuration:".bold(), config.metadata.name);
    println!();

    println!("{}", "Vault:".bold());
    println!("  Address: {}", spec.vault.address);
    println!("  Role: {}", spec.vault.role);
    println!("  Token: {}", redact(Some(&spec.vault.token)));
    println!();

    println!("{}", "Host Directory:".bold());
    println!("  URL: {}", spec.directory.url);
    println!(
        "  Access key: {}",
        spec.directory.access_key.as_deref().unwrap_or("(not set)")
    );
    println!("  Secret key: {}", redact(spec.directory.secret_key.as_deref()));
    println!();

    println!("{}", "Verification:".bold());
    println!(
        "  Replay window: {}",
        humantime::format_duration(spec.verification.replay_window)
    );
    println!(
        "  Max future skew: {}",
        humantime::format_duration(spec.verification.max_future_skew)
    );
    println!(
        "  Require volume isolation: {}",
        spec.verification.require_volume_isolation
    );
    println!();

    println!("{}", "Network:".bold());
    println!("  Listen: {}:{}", spec.network.bind_address, spec.network.port);
    if spec.observability.metrics.enabled {
        println!("  Metrics port: {}", spec.observability.metrics.port);
    } else {
        println!("  Metrics: {}", "disabled".dimmed());
    }
    println!(
        "  Logging: {} ({})",
        spec.observability.logging.level, spec.observability.logging.format
    );
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = BrokerConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    std::fs::write(&output, SAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
