// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! FX Desk Client - Encrypted Back-Office Transport
//!
//! HTTP client core shared by the FX-order back-office portals. Request
//! bodies are sealed in a hybrid RSA-OAEP + AES-256-GCM envelope, encrypted
//! responses are opened with the per-request key, and expired sessions are
//! recovered through a single-flight token refresh.
//!
//! ## Modules
//!
//! - `auth` - Session tokens and the refresh coordinator
//! - `client` - `SecureClient`, the request/response pipeline and transport
//! - `config` - Environment configuration
//! - `envelope` - Envelope encryption primitives and wire format
//! - `keys` - Server public key parsing and caching
//! - `notify` - User-visible notifications
//! - `policy` - Which requests are encrypted

pub mod auth;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod notify;
pub mod policy;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiRequest, ApiResponse, SecureClient};
pub use config::ClientConfig;
pub use error::ClientError;
