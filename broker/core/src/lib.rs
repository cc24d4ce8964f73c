// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Vault Broker Core
//!
//! Signed credential issuance for untrusted hosts: request signatures,
//! broker session management, request verification and the hybrid
//! envelope that carries each minted secret back to its host.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Everything the `vault-broker` binary serves, minus process wiring

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
