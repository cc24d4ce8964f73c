// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Request messages, credentials, session state and the two external
//! boundaries (secret store, host directory) the broker depends on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Protocol types and anti-corruption traits; no I/O

pub mod broker_config;
pub mod credential;
pub mod host_directory;
pub mod message;
pub mod secret_store;
pub mod session;
