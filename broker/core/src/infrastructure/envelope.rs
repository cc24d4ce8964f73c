// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Hybrid envelope sealing a minted secret to one host's RSA public key.
//!
//! ```text
//! base64( RSA-OAEP-SHA256(aes_key) || nonce[12] || AES-256-GCM(secret) )
//! ```
//!
//! The wrapped key is exactly `modulus_size` bytes, so the recipient can
//! split the blob without a length prefix. The envelope carries no
//! signature: the request that produced it was already authenticated.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand_core::{OsRng, RngCore};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope encryption failed: {0}")]
    Encryption(String),

    #[error("envelope decryption failed: {0}")]
    Decryption(String),

    #[error("malformed envelope: {0}")]
    Malformed(String),
}

/// Seal `secret` so only the holder of the private half of `recipient` can read it.
pub fn encrypt_for(recipient: &RsaPublicKey, secret: &[u8]) -> Result<String, EnvelopeError> {
    let mut key_bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key_bytes);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), secret)
        .map_err(|e| EnvelopeError::Encryption(format!("AES-GCM: {}", e)))?;

    let wrapped_key = recipient
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &key_bytes)
        .map_err(|e| EnvelopeError::Encryption(format!("RSA-OAEP: {}", e)))?;
    key_bytes.fill(0);

    let mut blob = Vec::with_capacity(wrapped_key.len() + NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&wrapped_key);
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(blob))
}

/// Open an envelope produced by [`encrypt_for`].
pub fn decrypt_with(key: &RsaPrivateKey, envelope: &str) -> Result<Vec<u8>, EnvelopeError> {
    let blob = STANDARD
        .decode(envelope.trim())
        .map_err(|e| EnvelopeError::Malformed(format!("not base64: {}", e)))?;

    let wrapped_len = key.size();
    if blob.len() < wrapped_len + NONCE_SIZE {
        return Err(EnvelopeError::Malformed(format!(
            "{} bytes is shorter than the {}-byte header",
            blob.len(),
            wrapped_len + NONCE_SIZE
        )));
    }

    let (wrapped_key, rest) = blob.split_at(wrapped_len);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let mut key_bytes = key
        .decrypt(Oaep::new::<Sha256>(), wrapped_key)
        .map_err(|e| EnvelopeError::Decryption(format!("RSA-OAEP: {}", e)))?;
    if key_bytes.len() != KEY_SIZE {
        return Err(EnvelopeError::Decryption(format!(
            "unwrapped key is {} bytes, expected {}",
            key_bytes.len(),
            KEY_SIZE
        )));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    key_bytes.fill(0);

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| EnvelopeError::Decryption(format!("AES-GCM: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn key_pair(slot: usize) -> &'static RsaPrivateKey {
        static KEYS: OnceLock<[RsaPrivateKey; 2]> = OnceLock::new();
        &KEYS.get_or_init(|| {
            [
                RsaPrivateKey::new(&mut OsRng, 1024).unwrap(),
                RsaPrivateKey::new(&mut OsRng, 1024).unwrap(),
            ]
        })[slot]
    }

    #[test]
    fn test_round_trip_recovers_exact_bytes() {
        let host = key_pair(0);
        let secret = b"s.4f8e1c0b-mounted-secret";

        let envelope = encrypt_for(&host.to_public_key(), secret).unwrap();
        let opened = decrypt_with(host, &envelope).unwrap();

        assert_eq!(opened, secret);
    }

    #[test]
    fn test_other_private_key_cannot_open() {
        let envelope = encrypt_for(&key_pair(0).to_public_key(), b"secret").unwrap();

        let result = decrypt_with(key_pair(1), &envelope);
        assert!(matches!(result, Err(EnvelopeError::Decryption(_))));
    }

    #[test]
    fn test_envelope_does_not_contain_plaintext() {
        let secret = b"plaintext-marker-value";
        let envelope = encrypt_for(&key_pair(0).to_public_key(), secret).unwrap();
        let blob = STANDARD.decode(&envelope).unwrap();

        assert!(!blob.windows(secret.len()).any(|w| w == secret));
        assert!(!envelope.contains("plaintext-marker-value"));
    }

    #[test]
    fn test_each_seal_is_fresh() {
        let public = key_pair(0).to_public_key();
        let a = encrypt_for(&public, b"same").unwrap();
        let b = encrypt_for(&public, b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let host = key_pair(0);
        let envelope = encrypt_for(&host.to_public_key(), b"secret").unwrap();
        let mut blob = STANDARD.decode(&envelope).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x80;

        let result = decrypt_with(host, &STANDARD.encode(blob));
        assert!(matches!(result, Err(EnvelopeError::Decryption(_))));
    }

    #[test]
    fn test_truncated_or_garbage_input() {
        let host = key_pair(0);
        assert!(matches!(decrypt_with(host, "!!!"), Err(EnvelopeError::Malformed(_))));
        assert!(matches!(
            decrypt_with(host, &STANDARD.encode([0u8; 16])),
            Err(EnvelopeError::Malformed(_))
        ));
    }
}
