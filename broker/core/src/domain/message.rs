// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Signed Request Messages
//!
//! The two request bodies a host may send to the broker, and the closed
//! [`SignedMessage`] enum that gives both of them a canonical byte encoding
//! and a replay-checkable timestamp.
//!
//! ## Wire Contract
//!
//! ```text
//! CreateRequest  ->  "<policies>,<hostUUID>,<timestamp>"
//! RevokeRequest  ->  "<accessor>,<timestamp>,<hostUUID>"
//! ```
//!
//! Field order and the `,` separator are part of the protocol. Changing
//! either breaks every deployed agent, so it requires a new API version.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// HTTP header carrying the base64 RSA signature over the canonical encoding.
pub const SIGNATURE_HEADER: &str = "X-Vault-Driver-Signature";

/// Error message a revoke gets back when the handle is unknown to the store.
pub const ALREADY_REVOKED_MESSAGE: &str = "token not found or already revoked";

/// Separator between canonical fields.
pub const CANONICAL_SEPARATOR: &str = ",";

/// Separator between policy names inside `CreateRequest::policies`.
pub const POLICY_SEPARATOR: char = ',';

/// Body of `POST /tokens`: a host asking for a scoped credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Comma-delimited policy names, passed through to the secret store.
    #[serde(default)]
    pub policies: String,

    #[serde(rename = "hostUUID", default)]
    pub host_uuid: String,

    /// RFC 3339 UTC timestamp, set by the signer.
    #[serde(default)]
    pub timestamp: String,

    /// Volume being attached; checked for per-host isolation when the gate is on.
    #[serde(rename = "volumeName", default, skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
}

/// Body of `DELETE /tokens`: a host asking to revoke a credential it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeRequest {
    /// Handle returned by the create call.
    #[serde(default)]
    pub accessor: String,

    #[serde(rename = "hostUUID", default)]
    pub host_uuid: String,

    #[serde(default)]
    pub timestamp: String,
}

/// The closed set of messages covered by the signature protocol.
///
/// Serialises untagged, so the JSON sent on the wire is the bare request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SignedMessage {
    Create(CreateRequest),
    Revoke(RevokeRequest),
}

impl SignedMessage {
    /// Deterministic byte sequence covered by the signature.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let fields: [&str; 3] = match self {
            Self::Create(req) => [
                req.policies.as_str(),
                req.host_uuid.as_str(),
                req.timestamp.as_str(),
            ],
            Self::Revoke(req) => [
                req.accessor.as_str(),
                req.timestamp.as_str(),
                req.host_uuid.as_str(),
            ],
        };
        fields.join(CANONICAL_SEPARATOR).into_bytes()
    }

    /// Raw timestamp string as carried in the message.
    pub fn timestamp(&self) -> &str {
        match self {
            Self::Create(req) => &req.timestamp,
            Self::Revoke(req) => &req.timestamp,
        }
    }

    /// Parse the embedded timestamp, `None` if it is not valid RFC 3339.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.timestamp())
    }

    /// Host identifier the message claims to come from.
    pub fn host_uuid(&self) -> &str {
        match self {
            Self::Create(req) => &req.host_uuid,
            Self::Revoke(req) => &req.host_uuid,
        }
    }

    /// Overwrite the timestamp field with `at`.
    pub fn stamp(&mut self, at: DateTime<Utc>) {
        let formatted = format_timestamp(at);
        match self {
            Self::Create(req) => req.timestamp = formatted,
            Self::Revoke(req) => req.timestamp = formatted,
        }
    }
}

impl From<CreateRequest> for SignedMessage {
    fn from(req: CreateRequest) -> Self {
        Self::Create(req)
    }
}

impl From<RevokeRequest> for SignedMessage {
    fn from(req: RevokeRequest) -> Self {
        Self::Revoke(req)
    }
}

/// Format a timestamp the way signers stamp messages (nanosecond RFC 3339, `Z` suffix).
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Split the caller-supplied policy string into individual policy names.
pub fn split_policies(policies: &str) -> Vec<String> {
    policies
        .split(POLICY_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn create(policies: &str, host: &str, ts: &str) -> SignedMessage {
        SignedMessage::Create(CreateRequest {
            policies: policies.to_string(),
            host_uuid: host.to_string(),
            timestamp: ts.to_string(),
            volume_name: Some("v1".to_string()),
        })
    }

    #[test]
    fn test_create_canonical_encoding_is_policies_host_timestamp() {
        let msg = create("a,b", "h1", "t1");
        assert_eq!(msg.canonical_bytes(), b"a,b,h1,t1".to_vec());
    }

    #[test]
    fn test_create_canonical_encoding_ignores_volume_name() {
        let mut with_volume = create("a,b", "h1", "t1");
        let without_volume = create("a,b", "h1", "t1");
        if let SignedMessage::Create(req) = &mut with_volume {
            req.volume_name = Some("other".to_string());
        }
        assert_eq!(with_volume.canonical_bytes(), without_volume.canonical_bytes());
    }

    #[test]
    fn test_revoke_canonical_encoding_is_accessor_timestamp_host() {
        let msg = SignedMessage::Revoke(RevokeRequest {
            accessor: "acc-123".to_string(),
            host_uuid: "h1".to_string(),
            timestamp: "t1".to_string(),
        });
        assert_eq!(msg.canonical_bytes(), b"acc-123,t1,h1".to_vec());
    }

    #[test]
    fn test_stamp_writes_parseable_utc_timestamp() {
        let mut msg = create("default", "h1", "");
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        msg.stamp(at);

        assert_eq!(msg.timestamp(), "2026-03-04T05:06:07.000000000Z");
        assert_eq!(msg.parsed_timestamp(), Some(at));
    }

    #[test]
    fn test_unparseable_timestamp_yields_none() {
        let msg = create("default", "h1", "2026-03-04 05:06:07 +0000 UTC");
        assert!(msg.parsed_timestamp().is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let body = serde_json::to_value(create("a", "h1", "t1")).unwrap();
        assert_eq!(body["policies"], "a");
        assert_eq!(body["hostUUID"], "h1");
        assert_eq!(body["timestamp"], "t1");
        assert_eq!(body["volumeName"], "v1");

        let parsed: RevokeRequest =
            serde_json::from_str(r#"{"accessor":"x","hostUUID":"h","timestamp":"t"}"#).unwrap();
        assert_eq!(parsed.accessor, "x");
        assert_eq!(parsed.host_uuid, "h");
    }

    #[test]
    fn test_split_policies() {
        assert_eq!(split_policies("read-secrets"), vec!["read-secrets"]);
        assert_eq!(split_policies("a, b,,c"), vec!["a", "b", "c"]);
        assert!(split_policies("").is_empty());
    }
}
