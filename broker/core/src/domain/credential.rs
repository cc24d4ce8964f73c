// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Credential
//!
//! A freshly minted secret and the handle used to revoke it later. A
//! [`Credential`] never leaves the broker in plaintext: it is sealed into an
//! [`EncryptedCredentialResponse`] for the requesting host immediately after
//! minting and then dropped.

use serde::{Deserialize, Serialize};

/// Secret plus revocation handle, alive only for the duration of one create call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Opaque handle (secret-store accessor); carries no authority on its own.
    pub accessor: String,
    pub secret: String,
}

impl Credential {
    pub fn new(accessor: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            accessor: accessor.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("accessor", &self.accessor)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Response body of `POST /tokens`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCredentialResponse {
    pub accessor: String,

    /// Secret sealed to the requesting host's public key (base64 hybrid envelope).
    #[serde(rename = "encryptedToken")]
    pub encrypted_token: String,
}
