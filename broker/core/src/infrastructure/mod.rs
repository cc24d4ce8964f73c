// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod signature;
pub mod envelope;
pub mod vault;
pub mod rancher;

pub use rancher::{InMemoryHostDirectory, RancherHostDirectory};
pub use vault::VaultSecretStore;
