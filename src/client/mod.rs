// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Secure Client
//!
//! HTTP client for the FX back-office API with transparent envelope
//! encryption and token refresh.
//!
//! ## Request Lifecycle
//!
//! 1. The policy decides whether the body is sealed
//! 2. Request stages run: `Encrypt` then `Authorize`
//! 3. The transport sends the attempt
//! 4. 2xx: response stages run (`Decrypt`) and the body is returned
//! 5. 401: the request joins the refresh episode and replays once
//! 6. Anything else: the user is notified and the error is returned
//!
//! One `SecureClient` is built at start-up and cloned into every caller;
//! clones share the key cache, session and refresh coordinator.

mod auth_flow;
pub mod pipeline;
pub mod request;
pub mod transport;

use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

pub use pipeline::{Exchange, RequestStage, ResponseStage, REQUEST_STAGES, RESPONSE_STAGES};
pub use request::{ApiRequest, ApiResponse, OutboundRequest, REQUEST_ID_HEADER, SKIP_ENCRYPTION_HEADER};
pub use transport::{ReqwestTransport, Transport, TransportError};

use crate::auth::{LoggingSessionEvents, RefreshCoordinator, RefreshPhase, SessionEvents, SessionStore};
use crate::config::{ClientConfig, Endpoints};
use crate::error::ClientError;
use crate::keys::{PublicKeyMaterial, PublicKeyStore};
use crate::notify::{Notice, Notifier, TracingNotifier};
use crate::policy::{normalize_path, EncryptionPolicy};

const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";
const TIMEOUT_MESSAGE: &str = "Request timed out. Please try again.";
const SESSION_ENDED_REASON: &str = "session ended";
const NOT_SIGNED_IN_REASON: &str = "not signed in";
const NETWORK_ERROR_MESSAGE: &str = "Network error. Please check your connection.";
const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials";

/// Envelope-encrypting API client.
pub struct SecureClient<T: Transport = ReqwestTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for SecureClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> std::fmt::Debug for SecureClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureClient")
            .field("encryption_enabled", &self.inner.policy.is_enabled())
            .field("key_cached", &self.inner.keys.is_cached())
            .field("authenticated", &self.inner.session.is_authenticated())
            .field("refresh", &self.inner.refresh.state())
            .finish()
    }
}

struct Inner<T> {
    transport: T,
    policy: EncryptionPolicy,
    keys: PublicKeyStore,
    session: Arc<SessionStore>,
    refresh: RefreshCoordinator,
    endpoints: Endpoints,
    notifier: Arc<dyn Notifier>,
    events: Arc<dyn SessionEvents>,
}

/// Builder for [`SecureClient`].
pub struct SecureClientBuilder<T> {
    transport: T,
    policy: Option<EncryptionPolicy>,
    endpoints: Endpoints,
    session: Option<Arc<SessionStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    events: Option<Arc<dyn SessionEvents>>,
    public_key: Option<PublicKeyMaterial>,
}

impl<T: Transport> SecureClientBuilder<T> {
    pub fn policy(mut self, policy: EncryptionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Share an existing session store with the host application.
    pub fn session(mut self, session: Arc<SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn session_events(mut self, events: Arc<dyn SessionEvents>) -> Self {
        self.events = Some(events);
        self
    }

    /// Pre-load the server key instead of fetching it on first use.
    pub fn public_key(mut self, material: PublicKeyMaterial) -> Self {
        self.public_key = Some(material);
        self
    }

    pub fn build(self) -> Result<SecureClient<T>, ClientError> {
        let policy = match self.policy {
            Some(policy) => policy,
            None => EncryptionPolicy::standard()?,
        }
        .with_mandatory_skips(&self.endpoints.plaintext_endpoints());

        let keys = PublicKeyStore::new();
        if let Some(material) = self.public_key {
            keys.install(material);
        }

        Ok(SecureClient {
            inner: Arc::new(Inner {
                transport: self.transport,
                policy,
                keys,
                session: self.session.unwrap_or_default(),
                refresh: RefreshCoordinator::new(),
                endpoints: self.endpoints,
                notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
                events: self.events.unwrap_or_else(|| Arc::new(LoggingSessionEvents)),
            }),
        })
    }
}

impl SecureClient<ReqwestTransport> {
    /// Production client for the given configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(&config.api_base_url, config.request_timeout)?;
        let client = Self::builder(transport)
            .policy(config.load_policy()?)
            .endpoints(config.endpoints.clone())
            .build()?;

        info!(
            base_url = %config.api_base_url,
            encryption_enabled = config.encryption_enabled,
            rules = client.inner.policy.rules().len(),
            "Secure client initialized"
        );
        Ok(client)
    }
}

impl<T: Transport> SecureClient<T> {
    pub fn builder(transport: T) -> SecureClientBuilder<T> {
        SecureClientBuilder {
            transport,
            policy: None,
            endpoints: Endpoints::default(),
            session: None,
            notifier: None,
            events: None,
            public_key: None,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    pub fn policy(&self) -> &EncryptionPolicy {
        &self.inner.policy
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    /// Cached server key, if loaded.
    pub fn public_key(&self) -> Option<Arc<PublicKeyMaterial>> {
        self.inner.keys.public_key()
    }

    /// Current phase of the refresh coordinator.
    pub fn refresh_state(&self) -> RefreshPhase {
        self.inner.refresh.state()
    }

    /// Return the server key, fetching it if needed.
    pub async fn fetch_public_key(&self) -> Result<Arc<PublicKeyMaterial>, ClientError> {
        self.inner.ensure_public_key().await
    }

    /// Load the server key ahead of the first encrypted request.
    ///
    /// Failure is logged and swallowed; the first encrypted request retries.
    pub async fn warm_up(&self) {
        match self.inner.ensure_public_key().await {
            Ok(material) => debug!(fingerprint = %material.fingerprint(), "Encryption key ready"),
            Err(e) => warn!(error = %e, "Encryption key warm-up failed"),
        }
    }

    /// Send a request through the full pipeline.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let inner = &self.inner;
        let mut replayed = false;

        loop {
            let Exchange {
                request: outbound,
                symmetric_key,
                bearer,
            } = inner.prepare(&request).await?;

            debug!(
                request_id = %request.id(),
                method = %request.method(),
                path = %request.path(),
                encrypted = symmetric_key.is_some(),
                replay = replayed,
                "Dispatching request"
            );

            let mut response = match inner.transport.send(outbound).await {
                Ok(response) => response,
                Err(e) => return Err(inner.transport_failure(&request, e)),
            };

            if response.status.is_success() {
                inner.open(symmetric_key.as_ref(), &mut response)?;
                return Ok(response);
            }

            // Error bodies may be sealed too; fall back to the raw body.
            if let Err(e) = inner.open(symmetric_key.as_ref(), &mut response) {
                debug!(request_id = %request.id(), error = %e, "Error body could not be opened");
            }

            if response.status != StatusCode::UNAUTHORIZED {
                return Err(inner.server_failure(&request, &response));
            }

            if inner.is_login(&request) {
                let message = response
                    .server_message()
                    .unwrap_or_else(|| INVALID_CREDENTIALS_MESSAGE.to_string());
                return Err(ClientError::Authentication(message));
            }

            if replayed {
                warn!(request_id = %request.id(), path = %request.path(), "Unauthorized after token refresh");
                return Err(inner.server_failure(&request, &response));
            }

            inner.recover_session(bearer.as_deref()).await?;
            replayed = true;
            info!(request_id = %request.id(), path = %request.path(), "Replaying request after token refresh");
        }
    }

    /// Send and deserialise the response body.
    pub async fn send_json<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, ClientError> {
        let response = self.send(request).await?;
        Ok(serde_json::from_value(response.body)?)
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        Ok(self.send(ApiRequest::get(path)).await?.body)
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        Ok(self.send(ApiRequest::post(path).body(body)).await?.body)
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        Ok(self.send(ApiRequest::put(path).body(body)).await?.body)
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        Ok(self.send(ApiRequest::patch(path).body(body)).await?.body)
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        Ok(self.send(ApiRequest::delete(path)).await?.body)
    }
}

impl<T: Transport> Inner<T> {
    async fn ensure_public_key(&self) -> Result<Arc<PublicKeyMaterial>, ClientError> {
        self.keys.get_or_fetch(|| self.download_public_key()).await
    }

    /// Plain GET of the key endpoint, outside the pipeline.
    async fn download_public_key(&self) -> Result<String, ClientError> {
        let path = &self.endpoints.public_key_path;
        let mut request = OutboundRequest::new(Method::GET, path.as_str());
        if let Some(token) = self.session.access_token() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                request.headers.insert(AUTHORIZATION, value);
            }
        }

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ClientError::KeyFetch(format!("GET {path} failed: {e}")))?;

        if !response.status.is_success() {
            return Err(ClientError::KeyFetch(format!(
                "GET {path} returned {}",
                response.status
            )));
        }

        extract_public_key(&response.body)
            .ok_or_else(|| ClientError::KeyFetch(format!("GET {path} returned no public key")))
    }

    fn is_login(&self, request: &ApiRequest) -> bool {
        normalize_path(request.path()) == normalize_path(&self.endpoints.login_path)
    }

    /// Get a usable access token for the replay.
    ///
    /// Only a 401 for the live session token starts a refresh episode. A
    /// session that has already ended is reported without a second forced
    /// logout.
    async fn recover_session(&self, used_token: Option<&str>) -> Result<(), ClientError> {
        match (used_token, self.session.access_token()) {
            // Another request already refreshed past the token this one used.
            (used, Some(current)) if used != Some(current.as_str()) => {
                debug!("Access token already rotated; replaying without a new refresh");
                return Ok(());
            }
            (Some(_), None) => {
                debug!("Session ended while the request was in flight");
                return Err(ClientError::TokenRefresh(SESSION_ENDED_REASON.to_string()));
            }
            (None, None) => {
                debug!("Unauthorized without a session; nothing to refresh");
                return Err(ClientError::TokenRefresh(NOT_SIGNED_IN_REASON.to_string()));
            }
            (_, Some(_)) => {}
        }
        self.refresh
            .refresh(|| self.perform_refresh())
            .await
            .map(|_| ())
    }

    fn transport_failure(&self, request: &ApiRequest, error: TransportError) -> ClientError {
        let error = ClientError::from(error);
        warn!(
            request_id = %request.id(),
            path = %request.path(),
            error = %error,
            "Request failed before a response"
        );
        // A timeout is transient; the user can simply retry.
        let notice = match error {
            ClientError::Timeout => Notice::warning(TIMEOUT_MESSAGE),
            _ => Notice::error(NETWORK_ERROR_MESSAGE),
        };
        self.notifier.notify(notice);
        error
    }

    fn server_failure(&self, request: &ApiRequest, response: &ApiResponse) -> ClientError {
        let message = response
            .server_message()
            .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string());
        warn!(
            request_id = %request.id(),
            path = %request.path(),
            status = %response.status,
            "Request rejected by server"
        );
        self.notifier.notify(Notice::error(message.clone()));
        ClientError::Server {
            status: response.status,
            message,
        }
    }
}

/// Pull the key string out of the shapes the key endpoint is known to return.
fn extract_public_key(body: &Value) -> Option<String> {
    let data = body.get("data");
    body.get("publicKey")
        .or_else(|| data.and_then(|d| d.get("publicKey")))
        .or_else(|| data.filter(|d| d.is_string()))
        .or_else(|| Some(body).filter(|b| b.is_string()))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;
    use crate::auth::AuthTokens;
    use crate::envelope::EncryptionEnvelope;
    use crate::notify::NoticeLevel;
    use crate::testing::{self, MockTransport, RecordingNotifier, RecordingSessionEvents};

    struct Harness {
        client: SecureClient<MockTransport>,
        transport: MockTransport,
        notifier: Arc<RecordingNotifier>,
        events: Arc<RecordingSessionEvents>,
    }

    fn harness(transport: MockTransport, tokens: Option<AuthTokens>, with_key: bool) -> Harness {
        let notifier = Arc::new(RecordingNotifier::default());
        let events = Arc::new(RecordingSessionEvents::default());
        let session = Arc::new(match tokens {
            Some(tokens) => SessionStore::with_tokens(tokens),
            None => SessionStore::new(),
        });

        let mut builder = SecureClient::builder(transport.clone())
            .session(session)
            .notifier(notifier.clone())
            .session_events(events.clone());
        if with_key {
            builder = builder.public_key(testing::public_material().clone());
        }

        Harness {
            client: builder.build().unwrap(),
            transport,
            notifier,
            events,
        }
    }

    fn stale_session() -> Option<AuthTokens> {
        Some(AuthTokens::new("stale", Some("refresh-1".into())))
    }

    fn ok(body: Value) -> Result<ApiResponse, TransportError> {
        Ok(ApiResponse::new(StatusCode::OK, body))
    }

    fn unauthorized(message: &str) -> Result<ApiResponse, TransportError> {
        Ok(ApiResponse::new(
            StatusCode::UNAUTHORIZED,
            json!({ "message": message }),
        ))
    }

    fn envelope_of(request: &OutboundRequest) -> EncryptionEnvelope {
        serde_json::from_value(request.body.clone().unwrap()).unwrap()
    }

    /// Backend that accepts only the token "fresh" and grants it on refresh.
    fn refreshing_backend(refresh_succeeds: bool) -> MockTransport {
        MockTransport::new(move |request| {
            Box::pin(async move {
                if request.path == "/users/refresh-token" {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    return if refresh_succeeds {
                        ok(json!({ "data": { "accessToken": "fresh" } }))
                    } else {
                        unauthorized("Refresh token expired")
                    };
                }
                if request.bearer() == Some("fresh") {
                    ok(json!({ "path": request.path }))
                } else {
                    unauthorized("jwt expired")
                }
            })
        })
    }

    #[tokio::test]
    async fn concurrent_401s_share_one_refresh_and_replay() {
        let h = harness(refreshing_backend(true), stale_session(), true);

        let mut handles = Vec::new();
        for i in 0..5 {
            let client = h.client.clone();
            handles.push(tokio::spawn(async move { client.get(&format!("/orders/{i}")).await }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            let body = handle.await.unwrap().unwrap();
            assert_eq!(body, json!({ "path": format!("/orders/{i}") }));
        }

        assert_eq!(h.transport.count_path("/users/refresh-token"), 1);
        let order_calls = h
            .transport
            .requests()
            .iter()
            .filter(|r| r.path.starts_with("/orders/"))
            .count();
        assert_eq!(order_calls, 10);

        assert_eq!(h.client.session().access_token().as_deref(), Some("fresh"));
        assert_eq!(h.client.session().refresh_token().as_deref(), Some("refresh-1"));
        assert_eq!(h.client.refresh_state(), RefreshPhase::Idle);
        assert!(h.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn refresh_call_is_plaintext_without_bearer() {
        let h = harness(refreshing_backend(true), stale_session(), true);
        h.client.get("/orders/1").await.unwrap();

        let refresh = h
            .transport
            .requests()
            .into_iter()
            .find(|r| r.path == "/users/refresh-token")
            .unwrap();
        assert_eq!(refresh.body, Some(json!({ "refreshToken": "refresh-1" })));
        assert!(refresh.bearer().is_none());
    }

    #[tokio::test]
    async fn failed_refresh_rejects_everyone_and_logs_out_once() {
        let h = harness(refreshing_backend(false), stale_session(), true);

        let mut handles = Vec::new();
        for i in 0..5 {
            let client = h.client.clone();
            handles.push(tokio::spawn(async move { client.get(&format!("/orders/{i}")).await }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, ClientError::TokenRefresh(_)));
        }

        assert_eq!(h.transport.count_path("/users/refresh-token"), 1);
        assert!(!h.client.session().is_authenticated());
        assert_eq!(h.events.logout_count(), 1);
        assert_eq!(h.events.redirects(), vec!["/login".to_string()]);

        let blocking: Vec<_> = h
            .notifier
            .notices()
            .into_iter()
            .filter(|n| !n.dismissible)
            .collect();
        assert_eq!(blocking.len(), 1);
        assert_eq!(h.client.refresh_state(), RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn late_401_after_failed_refresh_does_not_log_out_twice() {
        let transport = MockTransport::new(|request| {
            Box::pin(async move {
                match request.path.as_str() {
                    "/users/refresh-token" => unauthorized("expired"),
                    "/slow" => {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        unauthorized("Token expired")
                    }
                    _ => unauthorized("Token expired"),
                }
            })
        });
        let h = harness(transport, stale_session(), true);

        let fast = h.client.clone();
        let slow = h.client.clone();
        let (fast, slow) = tokio::join!(fast.get("/fast"), slow.get("/slow"));

        assert!(matches!(fast, Err(ClientError::TokenRefresh(ref reason)) if reason == "expired"));
        assert!(matches!(slow, Err(ClientError::TokenRefresh(ref reason)) if reason == SESSION_ENDED_REASON));
        assert_eq!(h.transport.count_path("/users/refresh-token"), 1);
        assert_eq!(h.client.inner.refresh.episodes(), 1);
        assert_eq!(h.events.logout_count(), 1);
        assert_eq!(h.events.redirects(), vec!["/login".to_string()]);
        let blocking = h.notifier.notices().into_iter().filter(|n| !n.dismissible).count();
        assert_eq!(blocking, 1);
    }

    #[tokio::test]
    async fn unauthorized_without_session_is_not_a_forced_logout() {
        let transport = MockTransport::new(|_| Box::pin(async { unauthorized("Sign in first") }));
        let h = harness(transport, None, true);

        let err = h.client.get("/orders/1").await.unwrap_err();
        assert!(matches!(err, ClientError::TokenRefresh(ref reason) if reason == NOT_SIGNED_IN_REASON));
        assert_eq!(h.transport.count_path("/users/refresh-token"), 0);
        assert_eq!(h.events.logout_count(), 0);
        assert!(h.events.redirects().is_empty());
        assert!(h.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn keyless_request_passes_envelope_shaped_response_through() {
        let sealed = json!({ "encryptedData": "b3BhcXVl", "iv": "aXYtaXYtaXYtaXY=" });
        let body = sealed.clone();
        let transport = MockTransport::new(move |_| {
            let body = body.clone();
            Box::pin(async move { ok(body) })
        });
        let h = harness(transport, stale_session(), false);

        let response = h.client.send(ApiRequest::get("/fxorders/abc123")).await.unwrap();
        assert_eq!(response.body, sealed);
        assert!(h.client.public_key().is_none());
        assert_eq!(h.transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn second_401_is_surfaced_not_retried() {
        let transport = MockTransport::new(|request| {
            Box::pin(async move {
                if request.path == "/users/refresh-token" {
                    ok(json!({ "data": { "accessToken": "fresh" } }))
                } else {
                    unauthorized("Access denied")
                }
            })
        });
        let h = harness(transport, stale_session(), true);

        let err = h.client.get("/orders/1").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Server { status, ref message } if status == StatusCode::UNAUTHORIZED && message == "Access denied"
        ));
        assert_eq!(h.transport.count_path("/orders/1"), 2);
        assert_eq!(h.transport.count_path("/users/refresh-token"), 1);
        assert_eq!(h.notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn login_401_never_refreshes() {
        let transport = MockTransport::new(|request| {
            Box::pin(async move {
                match request.path.as_str() {
                    "/users/login" => unauthorized("Invalid email or password"),
                    _ => ok(json!({ "data": { "accessToken": "fresh" } })),
                }
            })
        });
        let h = harness(transport, stale_session(), true);

        let err = h
            .client
            .login(&json!({ "email": "dealer@fxdesk.test", "password": "wrong" }))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Authentication(ref msg) if msg == "Invalid email or password"));
        assert_eq!(h.transport.count_path("/users/refresh-token"), 0);
        assert!(h.notifier.notices().is_empty());
        assert_eq!(h.events.logout_count(), 0);
    }

    #[tokio::test]
    async fn login_stores_tokens_and_sends_plaintext() {
        let transport = MockTransport::new(|request| {
            Box::pin(async move {
                match request.path.as_str() {
                    "/users/login" => ok(json!({
                        "data": { "accessToken": "a1", "refreshToken": "r1" }
                    })),
                    _ => ok(json!({ "bearer": request.bearer() })),
                }
            })
        });
        let h = harness(transport, None, true);

        let tokens = h
            .client
            .login(&json!({ "email": "dealer@fxdesk.test", "password": "secret" }))
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "a1");
        assert_eq!(h.client.session().refresh_token().as_deref(), Some("r1"));

        let login = &h.transport.requests()[0];
        assert_eq!(
            login.body.as_ref().unwrap()["email"],
            json!("dealer@fxdesk.test")
        );

        let body = h.client.get("/profile").await.unwrap();
        assert_eq!(body, json!({ "bearer": "a1" }));
    }

    #[tokio::test]
    async fn logout_clears_session_and_redirects() {
        let transport = MockTransport::new(|_| Box::pin(async { ok(json!({})) }));
        let h = harness(transport, stale_session(), true);

        h.client.logout().await;

        assert_eq!(h.transport.count_path("/users/logout"), 1);
        assert!(!h.client.session().is_authenticated());
        assert_eq!(h.events.logout_count(), 1);
        assert_eq!(h.events.redirects(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn encrypted_roundtrip_through_mock_server() {
        let transport = MockTransport::new(|request| {
            Box::pin(async move {
                let (body, key) = testing::open_request_envelope(&envelope_of(&request));
                assert_eq!(body, json!({ "amount": 100, "currency": "USD" }));
                ok(testing::seal_response(&json!({ "orderId": "abc123" }), &key))
            })
        });
        let h = harness(transport, stale_session(), true);

        let body = h
            .client
            .post("/fxorders", json!({ "amount": 100, "currency": "USD" }))
            .await
            .unwrap();
        assert_eq!(body, json!({ "orderId": "abc123" }));

        let sent = &h.transport.requests()[0];
        let plaintext = json!({ "amount": 100, "currency": "USD" }).to_string();
        let wire = sent.body.as_ref().unwrap().as_object().unwrap();
        assert_eq!(wire.len(), 3);
        for field in ["encryptedData", "encryptedAESKey", "iv"] {
            let value = wire[field].as_str().unwrap();
            assert_ne!(value, plaintext);
        }
        assert_eq!(sent.bearer(), Some("stale"));
    }

    #[tokio::test]
    async fn replay_uses_fresh_key_material() {
        let transport = MockTransport::new(|request| {
            Box::pin(async move {
                if request.path == "/users/refresh-token" {
                    return ok(json!({ "accessToken": "fresh" }));
                }
                if request.bearer() != Some("fresh") {
                    return unauthorized("jwt expired");
                }
                let (_, key) = testing::open_request_envelope(&envelope_of(&request));
                ok(testing::seal_response(&json!({ "orderId": "abc123" }), &key))
            })
        });
        let h = harness(transport, stale_session(), true);

        let body = h
            .client
            .post("/fxorders", json!({ "amount": 100, "currency": "USD" }))
            .await
            .unwrap();
        assert_eq!(body, json!({ "orderId": "abc123" }));

        let attempts: Vec<_> = h
            .transport
            .requests()
            .into_iter()
            .filter(|r| r.path == "/fxorders")
            .map(|r| envelope_of(&r))
            .collect();
        assert_eq!(attempts.len(), 2);
        assert_ne!(attempts[0].encrypted_aes_key, attempts[1].encrypted_aes_key);
        assert_ne!(attempts[0].iv, attempts[1].iv);
    }

    #[tokio::test]
    async fn key_is_fetched_once_for_concurrent_requests() {
        let pem = testing::public_pem();
        let transport = MockTransport::new(move |request| {
            let pem = pem.clone();
            Box::pin(async move {
                if request.path == "/encryption/public-key" {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    return ok(json!({ "data": { "publicKey": pem } }));
                }
                let (_, key) = testing::open_request_envelope(&envelope_of(&request));
                ok(testing::seal_response(&json!({ "accepted": true }), &key))
            })
        });
        let h = harness(transport, stale_session(), false);
        assert!(h.client.public_key().is_none());

        let mut handles = Vec::new();
        for _ in 0..3 {
            let client = h.client.clone();
            handles.push(tokio::spawn(async move {
                client.post("/fxorders", json!({ "amount": 1 })).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), json!({ "accepted": true }));
        }

        assert_eq!(h.transport.count_path("/encryption/public-key"), 1);
        assert!(h.client.public_key().is_some());
    }

    #[tokio::test]
    async fn key_fetch_failure_aborts_before_sending() {
        let transport = MockTransport::new(|request| {
            Box::pin(async move {
                if request.path == "/encryption/public-key" {
                    return Ok(ApiResponse::new(StatusCode::SERVICE_UNAVAILABLE, json!({})));
                }
                ok(json!({}))
            })
        });
        let h = harness(transport, stale_session(), false);

        h.client.warm_up().await;
        assert!(h.client.public_key().is_none());

        let err = h
            .client
            .post("/fxorders", json!({ "amount": 1 }))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::KeyFetch(_)));
        assert_eq!(h.transport.count_path("/fxorders"), 0);
        assert_eq!(h.transport.count_path("/encryption/public-key"), 2);
    }

    #[tokio::test]
    async fn opt_out_header_sends_plaintext_and_is_stripped() {
        let transport = MockTransport::new(|request| Box::pin(async move { ok(request.body.unwrap_or_default()) }));
        let h = harness(transport, stale_session(), true);

        let request = ApiRequest::post("/fxorders")
            .header(
                reqwest::header::HeaderName::from_static(SKIP_ENCRYPTION_HEADER),
                HeaderValue::from_static("true"),
            )
            .body(json!({ "amount": 5 }));
        let response = h.client.send(request).await.unwrap();

        assert_eq!(response.body, json!({ "amount": 5 }));
        let sent = &h.transport.requests()[0];
        assert!(sent.headers.get(SKIP_ENCRYPTION_HEADER).is_none());
        assert!(sent.headers.get(REQUEST_ID_HEADER).is_some());
    }

    #[tokio::test]
    async fn timeout_is_reported_and_not_retried() {
        let transport = MockTransport::new(|_| Box::pin(async { Err(TransportError::Timeout) }));
        let h = harness(transport, stale_session(), true);

        let err = h.client.get("/orders/1").await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout));
        assert_eq!(h.transport.requests().len(), 1);
        let notices = h.notifier.notices();
        assert_eq!(notices[0].message, TIMEOUT_MESSAGE);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert!(notices[0].dismissible);
    }

    #[tokio::test]
    async fn server_error_message_reaches_user() {
        let transport = MockTransport::new(|request| {
            Box::pin(async move {
                let (_, key) = testing::open_request_envelope(&envelope_of(&request));
                Ok(ApiResponse::new(
                    StatusCode::CONFLICT,
                    testing::seal_response(&json!({ "message": "Order already settled" }), &key),
                ))
            })
        });
        let h = harness(transport, stale_session(), true);

        let err = h
            .client
            .put("/fxorders/abc123", json!({ "status": "cancelled" }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Server { status, ref message } if status == StatusCode::CONFLICT && message == "Order already settled"
        ));
        assert_eq!(h.notifier.notices()[0].message, "Order already settled");
    }

    #[tokio::test]
    async fn send_json_deserialises_body() {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Order {
            order_id: String,
        }

        let transport = MockTransport::new(|_| Box::pin(async { ok(json!({ "orderId": "abc123" })) }));
        let h = harness(transport, stale_session(), true);

        let order: Order = h.client.send_json(ApiRequest::get("/fxorders/abc123")).await.unwrap();
        assert_eq!(order.order_id, "abc123");
    }

    #[test]
    fn public_key_response_shapes() {
        assert_eq!(extract_public_key(&json!({ "publicKey": "k1" })).as_deref(), Some("k1"));
        assert_eq!(
            extract_public_key(&json!({ "data": { "publicKey": "k2" } })).as_deref(),
            Some("k2")
        );
        assert_eq!(extract_public_key(&json!({ "data": "k3" })).as_deref(), Some("k3"));
        assert_eq!(extract_public_key(&json!("k4")).as_deref(), Some("k4"));
        assert!(extract_public_key(&json!({ "data": {} })).is_none());
        assert!(extract_public_key(&json!({ "publicKey": "" })).is_none());
    }

    #[tokio::test]
    async fn fxorders_end_to_end_over_http() {
        let router = Router::new().route(
            "/fxorders",
            post(|Json(envelope): Json<EncryptionEnvelope>| async move {
                let (body, key) = testing::open_request_envelope(&envelope);
                assert_eq!(body, json!({ "amount": 100, "currency": "USD" }));
                Json(testing::seal_response(&json!({ "orderId": "abc123" }), &key))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let transport = ReqwestTransport::new(format!("http://{addr}"), Duration::from_secs(5)).unwrap();
        let client = SecureClient::builder(transport)
            .public_key(testing::public_material().clone())
            .build()
            .unwrap();

        let body = client
            .post("/fxorders", json!({ "amount": 100, "currency": "USD" }))
            .await
            .unwrap();
        assert_eq!(body, json!({ "orderId": "abc123" }));
    }

    #[test]
    fn from_config_applies_policy_switch() {
        let mut config = ClientConfig::new("https://api.fxdesk.test");
        config.encryption_enabled = false;
        let client = SecureClient::from_config(&config).unwrap();
        assert!(!client.policy().is_enabled());
        assert!(client.public_key().is_none());
        assert_eq!(client.endpoints().login_route, "/login");
    }
}
