// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Envelope Encryption
//!
//! Hybrid scheme applied to request and response bodies:
//!
//! 1. The JSON body is serialised and encrypted with a fresh AES-256 key and IV
//! 2. The AES key is wrapped with the server's RSA public key
//! 3. Both travel together as an [`EncryptionEnvelope`]
//!
//! The server answers with data encrypted under the same AES key, so the
//! client keeps that key for exactly one request/response round trip.

pub mod cipher;
pub mod wire;

use serde_json::Value;

pub use cipher::{
    asymmetric_encrypt, symmetric_decrypt, symmetric_encrypt, Iv, SymmetricKey, IV_LEN,
    SYMMETRIC_KEY_LEN,
};
pub use wire::{EncryptionEnvelope, ResponseEnvelope};

use crate::error::ClientError;
use crate::keys::PublicKeyMaterial;

/// A sealed request body plus the key needed to open its response.
#[derive(Debug)]
pub struct SealedBody {
    pub envelope: EncryptionEnvelope,
    pub symmetric_key: SymmetricKey,
}

/// Seal a JSON body for the server.
///
/// Fails fast when no public key is available instead of sending plaintext.
pub fn build_envelope(
    body: &Value,
    public_key: Option<&PublicKeyMaterial>,
) -> Result<SealedBody, ClientError> {
    let public_key = public_key.ok_or_else(|| {
        ClientError::Encryption("server public key not loaded; refusing to send plaintext".to_string())
    })?;

    let plaintext = serde_json::to_string(body)
        .map_err(|e| ClientError::Encryption(format!("body is not serialisable: {e}")))?;
    let symmetric_key = SymmetricKey::generate();
    let iv = Iv::generate();

    let envelope = EncryptionEnvelope {
        encrypted_data: symmetric_encrypt(&plaintext, &symmetric_key, &iv)?,
        encrypted_aes_key: asymmetric_encrypt(&symmetric_key, public_key)?,
        iv: iv.to_base64(),
    };

    Ok(SealedBody {
        envelope,
        symmetric_key,
    })
}

/// Open an encrypted response with the key generated for its request.
pub fn open_envelope(envelope: &ResponseEnvelope, key: &SymmetricKey) -> Result<Value, ClientError> {
    let iv = Iv::from_base64(&envelope.iv)?;
    let plaintext = symmetric_decrypt(&envelope.encrypted_data, key, &iv)?;
    serde_json::from_str(&plaintext)
        .map_err(|e| ClientError::Decryption(format!("decrypted payload is not JSON: {e}")))
}
