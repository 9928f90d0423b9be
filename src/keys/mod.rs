// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Material
//!
//! The server publishes one RSA public key used to wrap the per-request
//! AES keys. This module parses that key and caches it for the lifetime of
//! the process.

pub mod material;
pub mod store;

pub use material::PublicKeyMaterial;
pub use store::PublicKeyStore;
