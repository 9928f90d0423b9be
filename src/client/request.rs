// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request and response values flowing through the client.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use url::form_urlencoded;
use uuid::Uuid;

use crate::error::ClientError;

/// Per-request opt-out header. Stripped before the request leaves.
pub const SKIP_ENCRYPTION_HEADER: &str = "x-skip-encryption";

/// Correlation id header.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A logical API call as built by the caller.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Value>,
    skip_encryption: bool,
    id: Uuid,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            skip_encryption: false,
            id: Uuid::new_v4(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Set a JSON body.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialise `body` as the JSON body.
    pub fn json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, ClientError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::Encryption(format!("body is not serialisable: {e}")))?;
        Ok(self.body(value))
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Send this request in plaintext regardless of the endpoint rules.
    pub fn skip_encryption(mut self) -> Self {
        self.skip_encryption = true;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Opt-out via [`ApiRequest::skip_encryption`] or the `X-Skip-Encryption` header.
    pub fn opted_out(&self) -> bool {
        self.skip_encryption
            || self
                .headers
                .get(SKIP_ENCRYPTION_HEADER)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    }

    /// Path plus encoded query string, the form the policy matches on.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        let separator = if self.path.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.path)
    }

    /// Plain outbound form: opt-out header removed, request id attached.
    pub(crate) fn to_outbound(&self) -> OutboundRequest {
        let mut headers = self.headers.clone();
        headers.remove(SKIP_ENCRYPTION_HEADER);
        if let Ok(id) = HeaderValue::from_str(&self.id.to_string()) {
            headers.insert(REQUEST_ID_HEADER, id);
        }
        OutboundRequest {
            method: self.method.clone(),
            path: self.path.clone(),
            query: self.query.clone(),
            headers,
            body: self.body.clone(),
            request_id: self.id,
        }
    }
}

/// What actually goes to the [`Transport`](super::Transport).
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub request_id: Uuid,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            request_id: Uuid::new_v4(),
        }
    }

    /// Bearer token carried by this request, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// A response as returned by the transport and, after the pipeline, to the caller.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Human-readable error message supplied by the server.
    ///
    /// Looks at `message`, `error` and `data.message`, then a bare string body.
    pub fn server_message(&self) -> Option<String> {
        let candidates = [
            self.body.get("message"),
            self.body.get("error"),
            self.body.get("data").and_then(|d| d.get("message")),
            Some(&self.body),
        ];
        candidates
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|m| !m.is_empty())
            .map(str::to_string)
    }
}
