// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session token storage and session lifecycle hooks.
//!
//! Only login, logout and the refresh leader write to [`SessionStore`];
//! every other code path reads from it.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// Access and refresh token pair for the signed-in user.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl AuthTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            updated_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// Tokens returned by the login and refresh endpoints.
///
/// Accepts `{"data": {"accessToken", "refreshToken"}}` as well as the same
/// fields at the top level.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenGrant {
    pub fn from_body(body: &Value) -> Option<Self> {
        let candidate = match body.get("data") {
            Some(data) if data.get("accessToken").is_some() => data,
            _ => body,
        };
        let grant: TokenGrant = serde_json::from_value(candidate.clone()).ok()?;
        if grant.access_token.trim().is_empty() {
            return None;
        }
        Some(grant)
    }
}

/// Shared, mutable auth state.
#[derive(Debug, Default)]
pub struct SessionStore {
    tokens: RwLock<Option<AuthTokens>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing session (e.g. restored from disk by the caller).
    pub fn with_tokens(tokens: AuthTokens) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }

    pub fn tokens(&self) -> Option<AuthTokens> {
        match self.tokens.read() {
            Ok(tokens) => tokens.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens().map(|t| t.access_token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tokens().and_then(|t| t.refresh_token)
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens().is_some()
    }

    pub fn set_tokens(&self, tokens: AuthTokens) {
        *self.write() = Some(tokens);
    }

    /// Store a refreshed access token, keeping the old refresh token unless
    /// the server rotated it.
    pub fn replace_access_token(&self, access_token: String, refresh_token: Option<String>) {
        let mut tokens = self.write();
        let refresh_token = refresh_token.or_else(|| tokens.as_ref().and_then(|t| t.refresh_token.clone()));
        *tokens = Some(AuthTokens::new(access_token, refresh_token));
    }

    pub fn clear(&self) {
        if self.write().take().is_some() {
            info!("Session tokens cleared");
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<AuthTokens>> {
        match self.tokens.write() {
            Ok(tokens) => tokens,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Hooks into the host application's session handling.
///
/// Implemented by the UI shell: `logged_out` dispatches its logout action
/// and purges cached data, `redirect_to_login` navigates to the login route.
pub trait SessionEvents: Send + Sync {
    fn logged_out(&self);
    fn redirect_to_login(&self, route: &str);
}

/// Session hooks for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSessionEvents;

impl SessionEvents for LoggingSessionEvents {
    fn logged_out(&self) {
        info!("Session ended");
    }

    fn redirect_to_login(&self, route: &str) {
        info!(route = %route, "Login required");
    }
}
