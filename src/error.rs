// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client error taxonomy.
//!
//! Cryptographic and key-fetch failures propagate to the caller untouched.
//! Refresh failures are additionally handled centrally (session cleared,
//! login redirect) before the error reaches each participant.

use reqwest::StatusCode;

/// Error type for every operation of the secure client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The server RSA public key could not be retrieved or parsed.
    #[error("Failed to fetch encryption key: {0}")]
    KeyFetch(String),

    /// Building the request envelope failed; nothing was sent.
    #[error("Request encryption failed: {0}")]
    Encryption(String),

    /// The response envelope was malformed or failed authentication.
    #[error("Response decryption failed: {0}")]
    Decryption(String),

    /// Credentials rejected by the login endpoint.
    #[error("{0}")]
    Authentication(String),

    /// The token refresh episode failed; the session has been invalidated.
    #[error("Session expired: {0}")]
    TokenRefresh(String),

    /// The transport gave up waiting for the server.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS, TLS, reset, ...).
    #[error("Network error: {0}")]
    Transport(String),

    /// Any other non-2xx response.
    #[error("{message}")]
    Server { status: StatusCode, message: String },

    /// Invalid or inconsistent configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A 2xx response whose body did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            ClientError::KeyFetch(_) => "key_fetch_error",
            ClientError::Encryption(_) => "encryption_error",
            ClientError::Decryption(_) => "decryption_error",
            ClientError::Authentication(_) => "authentication_error",
            ClientError::TokenRefresh(_) => "token_refresh_error",
            ClientError::Timeout => "timeout",
            ClientError::Transport(_) => "transport_error",
            ClientError::Server { .. } => "server_error",
            ClientError::Config(_) => "config_error",
            ClientError::InvalidResponse(_) => "invalid_response",
        }
    }

    /// HTTP status associated with the error, when the server produced one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            ClientError::Authentication(_) | ClientError::TokenRefresh(_) => {
                Some(StatusCode::UNAUTHORIZED)
            }
            _ => None,
        }
    }

    /// Whether the caller may reasonably try the same operation again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::KeyFetch(_) | ClientError::Timeout | ClientError::Transport(_)
        ) || matches!(self, ClientError::Server { status, .. } if status.is_server_error())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::InvalidResponse(e.to_string())
    }
}
