// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume agent
//!
//! The host side of the token protocol: sign requests with the host key,
//! talk to the token server, and keep each volume's credential and handle
//! in its private directory.

use std::path::PathBuf;

use thiserror::Error;
use vault_broker_core::infrastructure::envelope::EnvelopeError;
use vault_broker_core::infrastructure::signature::SignatureError;

pub mod client;
pub mod host;
pub mod volume;

pub use client::{IssuedCredential, RevokeOutcome, TokenServerClient};
pub use host::resolve_host_uuid;
pub use volume::{AttachedVolume, DetachOutcome, VolumeAgent};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to read host private key {}: {source}", path.display())]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("host key error: {0}")]
    Key(#[from] SignatureError),

    #[error("token server unreachable: {0}")]
    Transport(String),

    #[error("token server returned HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response from token server: {0}")]
    InvalidResponse(String),

    #[error("could not open credential envelope: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("volume storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid volume name: {0:?}")]
    InvalidVolumeName(String),

    #[error("could not determine host identity: {0}")]
    HostIdentity(String),
}
