// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the vault-broker CLI

pub mod config;
pub mod server;
pub mod volume;

pub use self::config::ConfigCommand;
pub use self::server::ServerArgs;
pub use self::volume::{AgentOptions, DriverStatus, VolumeCommand};
