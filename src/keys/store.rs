// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Server public key fetching and caching.
//!
//! ## Behaviour
//!
//! - The key is fetched lazily on the first encrypted request, or eagerly
//!   through `SecureClient::warm_up`
//! - Once cached it is reused for the rest of the session (no TTL)
//! - Concurrent callers share one in-flight fetch
//! - A failed fetch leaves the cache empty so the next call retries

use std::future::Future;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::material::PublicKeyMaterial;
use crate::error::ClientError;

/// Process-wide cache for the server RSA public key.
///
/// Built once at start-up and shared by reference with the client.
#[derive(Debug, Default)]
pub struct PublicKeyStore {
    /// Cached key
    cache: RwLock<Option<Arc<PublicKeyMaterial>>>,
    /// Held while a fetch is outstanding
    fetch_gate: Mutex<()>,
}

impl PublicKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached key, if one has been loaded.
    pub fn public_key(&self) -> Option<Arc<PublicKeyMaterial>> {
        match self.cache.read() {
            Ok(cache) => cache.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Check if a key is currently cached.
    pub fn is_cached(&self) -> bool {
        self.public_key().is_some()
    }

    /// Seed the cache with a key obtained out of band.
    pub fn install(&self, material: PublicKeyMaterial) -> Arc<PublicKeyMaterial> {
        let material = Arc::new(material);
        let mut cache = match self.cache.write() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        *cache = Some(Arc::clone(&material));
        material
    }

    /// Drop the cached key. The next `get_or_fetch` goes to the network.
    pub fn invalidate(&self) {
        let mut cache = match self.cache.write() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        if cache.take().is_some() {
            info!("Server encryption key invalidated");
        }
    }

    /// Return the cached key or run `fetch` to load it.
    ///
    /// `fetch` yields the raw key string; it runs at most once per cache
    /// miss no matter how many callers arrive while it is outstanding.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Arc<PublicKeyMaterial>, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ClientError>>,
    {
        if let Some(material) = self.public_key() {
            return Ok(material);
        }

        let _gate = self.fetch_gate.lock().await;

        // Another caller may have filled the cache while we waited.
        if let Some(material) = self.public_key() {
            debug!("Server encryption key loaded by concurrent fetch");
            return Ok(material);
        }

        let raw = fetch().await.map_err(|e| match e {
            ClientError::KeyFetch(_) => e,
            other => ClientError::KeyFetch(other.to_string()),
        })?;
        let material = PublicKeyMaterial::parse(&raw)?;

        info!(
            fingerprint = %material.fingerprint(),
            fetched_at = %material.fetched_at(),
            "Server encryption key cached"
        );
        Ok(self.install(material))
    }
}
