// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared test fixtures: one RSA keypair per test binary, a server-side
//! envelope opener, recording collaborators and a scripted transport.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use base64ct::{Base64, Encoding};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::{Oaep, RsaPrivateKey};
use serde_json::{json, Value};
use sha2::Sha256;

use crate::auth::SessionEvents;
use crate::client::{ApiResponse, OutboundRequest, Transport, TransportError};
use crate::envelope::{symmetric_decrypt, symmetric_encrypt, EncryptionEnvelope, Iv, SymmetricKey};
use crate::keys::PublicKeyMaterial;
use crate::notify::{Notice, Notifier};

static PRIVATE_KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
static PUBLIC_MATERIAL: OnceLock<PublicKeyMaterial> = OnceLock::new();

pub fn private_key() -> &'static RsaPrivateKey {
    PRIVATE_KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
}

pub fn public_material() -> &'static PublicKeyMaterial {
    PUBLIC_MATERIAL.get_or_init(|| PublicKeyMaterial::from_key(private_key().to_public_key()).unwrap())
}

pub fn public_pem() -> String {
    private_key()
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap()
}

/// Server side of the envelope: unwrap the AES key and decrypt the body.
pub fn open_request_envelope(envelope: &EncryptionEnvelope) -> (Value, SymmetricKey) {
    let wrapped = Base64::decode_vec(&envelope.encrypted_aes_key).unwrap();
    let key_bytes = private_key().decrypt(Oaep::new::<Sha256>(), &wrapped).unwrap();
    let key = SymmetricKey::from_bytes(&key_bytes).unwrap();
    let iv = Iv::from_base64(&envelope.iv).unwrap();
    let plaintext = symmetric_decrypt(&envelope.encrypted_data, &key, &iv).unwrap();
    (serde_json::from_str(&plaintext).unwrap(), key)
}

/// Encrypt a response body the way the server does, with the request's key.
pub fn seal_response(body: &Value, key: &SymmetricKey) -> Value {
    let iv = Iv::generate();
    let encrypted = symmetric_encrypt(&body.to_string(), key, &iv).unwrap();
    json!({ "encryptedData": encrypted, "iv": iv.to_base64() })
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

#[derive(Debug, Default)]
pub struct RecordingSessionEvents {
    pub logouts: AtomicUsize,
    pub redirects: Mutex<Vec<String>>,
}

impl RecordingSessionEvents {
    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

impl SessionEvents for RecordingSessionEvents {
    fn logged_out(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
    }

    fn redirect_to_login(&self, route: &str) {
        self.redirects.lock().unwrap().push(route.to_string());
    }
}

pub type MockFuture = Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send>>;
type Handler = dyn Fn(OutboundRequest) -> MockFuture + Send + Sync;

/// In-process transport driven by a closure. Records every request it sees.
#[derive(Clone)]
pub struct MockTransport {
    handler: Arc<Handler>,
    requests: Arc<Mutex<Vec<OutboundRequest>>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(OutboundRequest) -> MockFuture + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_path(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: OutboundRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(request).await
    }
}
