// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod session_manager;
pub mod verification;
pub mod broker_service;

pub use broker_service::{BrokerError, BrokerService};
pub use session_manager::{SessionError, SessionManager};
pub use verification::RequestVerifier;
