// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request Signature Protocol
//!
//! RSA PKCS#1 v1.5 over SHA-256 of a [`SignedMessage`]'s canonical bytes,
//! plus a freshness check on the timestamp embedded in the message.
//!
//! ```text
//! signer:    stamp(now) -> canonical_bytes -> SHA-256 -> RSA sign -> base64 header
//! verifier:  parse timestamp -> replay window -> SHA-256 -> RSA verify
//! ```
//!
//! Every verification failure surfaces as the same opaque
//! [`SignatureError::Invalid`]. The [`RejectReason`] it carries is for
//! debug logging inside the broker and must not be returned to callers.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::message::SignedMessage;

/// Why a signature was rejected. Internal diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Header missing or not valid base64.
    MalformedSignature,
    /// Embedded timestamp is not RFC 3339.
    MalformedTimestamp,
    /// Timestamp is older than the replay window.
    Expired,
    /// Timestamp is further in the future than the allowed skew.
    FromFuture,
    /// RSA verification failed.
    Mismatch,
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid RSA key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("signature invalid")]
    Invalid(RejectReason),
}

impl SignatureError {
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Invalid(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Accepted age range for a message timestamp, relative to the verifier clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayWindow {
    pub max_age: Duration,
    pub max_future_skew: Duration,
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(5 * 60),
            max_future_skew: Duration::from_secs(30),
        }
    }
}

impl ReplayWindow {
    pub fn new(max_age: Duration, max_future_skew: Duration) -> Self {
        Self {
            max_age,
            max_future_skew,
        }
    }

    pub fn check(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), RejectReason> {
        let age = now.signed_duration_since(issued_at);
        match age.to_std() {
            Ok(age) if age > self.max_age => Err(RejectReason::Expired),
            Ok(_) => Ok(()),
            Err(_) => {
                let ahead = (-age).to_std().unwrap_or(Duration::MAX);
                if ahead > self.max_future_skew {
                    Err(RejectReason::FromFuture)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Parse an RSA private key in PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`) PEM.
pub fn load_private_key_pem(pem: &str) -> Result<RsaPrivateKey, SignatureError> {
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|e| SignatureError::InvalidKey(format!("could not decode private key: {}", e)))
}

/// Parse an RSA public key in SPKI (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) PEM.
pub fn load_public_key_pem(pem: &str) -> Result<RsaPublicKey, SignatureError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| SignatureError::InvalidKey(format!("could not decode public key block: {}", e)))
}

/// Stamp `message` with the current time and sign it.
pub fn sign(message: &mut SignedMessage, key: &RsaPrivateKey) -> Result<Vec<u8>, SignatureError> {
    sign_at(message, key, Utc::now())
}

/// Stamp `message` with `at` and sign it.
pub fn sign_at(
    message: &mut SignedMessage,
    key: &RsaPrivateKey,
    at: DateTime<Utc>,
) -> Result<Vec<u8>, SignatureError> {
    message.stamp(at);
    sign_prepared(message, key)
}

/// Sign `message` exactly as it is, without touching its timestamp.
pub fn sign_prepared(message: &SignedMessage, key: &RsaPrivateKey) -> Result<Vec<u8>, SignatureError> {
    let hashed = Sha256::digest(message.canonical_bytes());
    key.sign(Pkcs1v15Sign::new::<Sha256>(), &hashed)
        .map_err(|e| SignatureError::SigningFailed(e.to_string()))
}

/// Verify `signature` over `message` against the current clock.
pub fn verify(
    signature: &[u8],
    message: &SignedMessage,
    key: &RsaPublicKey,
    window: &ReplayWindow,
) -> Result<(), SignatureError> {
    verify_at(signature, message, key, window, Utc::now())
}

/// Verify `signature` over `message` as if the verifier clock read `now`.
pub fn verify_at(
    signature: &[u8],
    message: &SignedMessage,
    key: &RsaPublicKey,
    window: &ReplayWindow,
    now: DateTime<Utc>,
) -> Result<(), SignatureError> {
    let issued_at = message
        .parsed_timestamp()
        .ok_or(SignatureError::Invalid(RejectReason::MalformedTimestamp))?;

    window.check(issued_at, now).map_err(SignatureError::Invalid)?;

    let hashed = Sha256::digest(message.canonical_bytes());
    key.verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, signature)
        .map_err(|_| SignatureError::Invalid(RejectReason::Mismatch))
}

/// Encode raw signature bytes for the signature header.
pub fn encode_signature(signature: &[u8]) -> String {
    STANDARD.encode(signature)
}

/// Decode the signature header value.
pub fn decode_signature(header: &str) -> Result<Vec<u8>, SignatureError> {
    let trimmed = header.trim();
    if trimmed.is_empty() {
        return Err(SignatureError::Invalid(RejectReason::MalformedSignature));
    }
    STANDARD
        .decode(trimmed)
        .map_err(|_| SignatureError::Invalid(RejectReason::MalformedSignature))
}
