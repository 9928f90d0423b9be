// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cipher primitives for the request envelope.
//!
//! - Bulk data: AES-256-GCM, 96-bit IV, tag appended to the ciphertext
//! - Key wrapping: RSA-OAEP with SHA-256
//! - Encoding: standard base64 with padding

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64ct::{Base64, Encoding};
use rsa::rand_core::OsRng as RsaOsRng;
use rsa::Oaep;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::ClientError;
use crate::keys::PublicKeyMaterial;

/// AES-256 key length in bytes.
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// GCM nonce length in bytes.
pub const IV_LEN: usize = 12;

/// Per-request AES key. Wiped from memory when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_LEN]);

impl SymmetricKey {
    /// Generate a fresh random key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SYMMETRIC_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ClientError> {
        let bytes: [u8; SYMMETRIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            ClientError::Decryption(format!(
                "symmetric key must be {SYMMETRIC_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey").finish_non_exhaustive()
    }
}

/// Initialization vector for one encryption operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    pub fn generate() -> Self {
        let mut bytes = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Decode the transport form of an IV.
    pub fn from_base64(encoded: &str) -> Result<Self, ClientError> {
        let bytes = Base64::decode_vec(encoded.trim())
            .map_err(|e| ClientError::Decryption(format!("IV is not valid base64: {e}")))?;
        let bytes: [u8; IV_LEN] = bytes.as_slice().try_into().map_err(|_| {
            ClientError::Decryption(format!("IV must be {IV_LEN} bytes, got {}", bytes.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_base64(&self) -> String {
        Base64::encode_string(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt `plaintext` under `key`/`iv`, returning base64 ciphertext with the tag appended.
pub fn symmetric_encrypt(plaintext: &str, key: &SymmetricKey, iv: &Iv) -> Result<String, ClientError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(iv.as_bytes()), plaintext.as_bytes())
        .map_err(|e| ClientError::Encryption(format!("AES-GCM encryption failed: {e}")))?;
    Ok(Base64::encode_string(&ciphertext))
}

/// Inverse of [`symmetric_encrypt`]. Any tampering fails the GCM tag check.
pub fn symmetric_decrypt(ciphertext: &str, key: &SymmetricKey, iv: &Iv) -> Result<String, ClientError> {
    let bytes = Base64::decode_vec(ciphertext.trim())
        .map_err(|e| ClientError::Decryption(format!("ciphertext is not valid base64: {e}")))?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(iv.as_bytes()), bytes.as_slice())
        .map_err(|_| ClientError::Decryption("authentication tag mismatch".to_string()))?;
    String::from_utf8(plaintext)
        .map_err(|e| ClientError::Decryption(format!("plaintext is not UTF-8: {e}")))
}

/// Wrap the symmetric key for the server with RSA-OAEP (SHA-256).
pub fn asymmetric_encrypt(key: &SymmetricKey, public_key: &PublicKeyMaterial) -> Result<String, ClientError> {
    let wrapped = public_key
        .key()
        .encrypt(&mut RsaOsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| ClientError::Encryption(format!("RSA-OAEP key wrap failed: {e}")))?;
    Ok(Base64::encode_string(&wrapped))
}
