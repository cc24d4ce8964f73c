// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! vault-broker CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Token server process wiring, the host-side volume agent,
//!   and the subcommands that drive them

pub mod agent;
pub mod commands;
pub mod daemon;
