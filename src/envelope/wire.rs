// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wire shapes of encrypted bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Encrypted request body as sent to the server.
///
/// ```json
/// { "encryptedData": "...", "encryptedAESKey": "...", "iv": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionEnvelope {
    #[serde(rename = "encryptedData")]
    pub encrypted_data: String,
    #[serde(rename = "encryptedAESKey", alias = "encryptedSymmetricKey")]
    pub encrypted_aes_key: String,
    pub iv: String,
}

/// Encrypted response body.
///
/// The server encrypts with the key the client generated for the request,
/// so the wrapped key field is optional here and ignored when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "encryptedData")]
    pub encrypted_data: String,
    pub iv: String,
    #[serde(
        rename = "encryptedAESKey",
        alias = "encryptedSymmetricKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub encrypted_aes_key: Option<String>,
}

impl ResponseEnvelope {
    /// Recognise an encrypted response body.
    ///
    /// Returns `None` for plain bodies, which pass through untouched.
    pub fn detect(body: &Value) -> Option<Self> {
        let object = body.as_object()?;
        let encrypted_data = object.get("encryptedData")?.as_str()?;
        let iv = object.get("iv")?.as_str()?;
        let encrypted_aes_key = object
            .get("encryptedAESKey")
            .or_else(|| object.get("encryptedSymmetricKey"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Self {
            encrypted_data: encrypted_data.to_string(),
            iv: iv.to_string(),
            encrypted_aes_key,
        })
    }
}

impl From<EncryptionEnvelope> for ResponseEnvelope {
    fn from(envelope: EncryptionEnvelope) -> Self {
        Self {
            encrypted_data: envelope.encrypted_data,
            iv: envelope.iv,
            encrypted_aes_key: Some(envelope.encrypted_aes_key),
        }
    }
}
