// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Parsing of the server's RSA public key.
//!
//! The backend hands the key out as an opaque string. Three encodings are
//! accepted: SPKI PEM (`BEGIN PUBLIC KEY`), PKCS#1 PEM
//! (`BEGIN RSA PUBLIC KEY`) and bare base64 SPKI/PKCS#1 DER.

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};

use crate::error::ClientError;

/// A parsed server public key plus bookkeeping used for logging.
#[derive(Debug, Clone)]
pub struct PublicKeyMaterial {
    key: RsaPublicKey,
    fingerprint: String,
    fetched_at: DateTime<Utc>,
}

impl PublicKeyMaterial {
    /// Parse the key string returned by the server.
    pub fn parse(raw: &str) -> Result<Self, ClientError> {
        // Keys pasted into JSON config often carry escaped newlines.
        let text = raw.trim().replace("\\n", "\n");
        if text.is_empty() {
            return Err(ClientError::KeyFetch("server returned an empty key".to_string()));
        }

        let key = if text.contains("BEGIN RSA PUBLIC KEY") {
            RsaPublicKey::from_pkcs1_pem(&text)
                .map_err(|e| ClientError::KeyFetch(format!("invalid PKCS#1 PEM: {e}")))?
        } else if text.contains("BEGIN PUBLIC KEY") {
            RsaPublicKey::from_public_key_pem(&text)
                .map_err(|e| ClientError::KeyFetch(format!("invalid SPKI PEM: {e}")))?
        } else {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            let der = Base64::decode_vec(&compact)
                .map_err(|e| ClientError::KeyFetch(format!("key is neither PEM nor base64: {e}")))?;
            RsaPublicKey::from_public_key_der(&der)
                .or_else(|_| RsaPublicKey::from_pkcs1_der(&der))
                .map_err(|e| ClientError::KeyFetch(format!("invalid DER key: {e}")))?
        };

        Self::from_key(key)
    }

    /// Wrap an already decoded key.
    pub fn from_key(key: RsaPublicKey) -> Result<Self, ClientError> {
        let fingerprint = fingerprint_of(&key)?;
        Ok(Self {
            key,
            fingerprint,
            fetched_at: Utc::now(),
        })
    }

    pub fn key(&self) -> &RsaPublicKey {
        &self.key
    }

    /// Hex SHA-256 of the DER encoding. Safe to log.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

fn fingerprint_of(key: &RsaPublicKey) -> Result<String, ClientError> {
    let der = key
        .to_public_key_der()
        .map_err(|e| ClientError::KeyFetch(format!("cannot encode key for fingerprint: {e}")))?;
    Ok(hex::encode(Sha256::digest(der.as_bytes())))
}
