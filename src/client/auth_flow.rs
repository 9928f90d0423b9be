// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login, logout and the refresh call made by the episode leader.

use reqwest::Method;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::request::{ApiRequest, OutboundRequest};
use super::transport::Transport;
use super::{Inner, SecureClient};
use crate::auth::{AuthTokens, RefreshResult, TokenGrant};
use crate::error::ClientError;
use crate::notify::Notice;

const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

impl<T: Transport> SecureClient<T> {
    /// Sign in and store the returned tokens.
    ///
    /// A `401` from the login endpoint is returned as
    /// [`ClientError::Authentication`] with the server's message and never
    /// starts a token refresh.
    pub async fn login<C: Serialize + ?Sized>(&self, credentials: &C) -> Result<AuthTokens, ClientError> {
        let request = ApiRequest::post(self.inner.endpoints.login_path.as_str()).json(credentials)?;
        let response = self.send(request).await?;

        let grant = TokenGrant::from_body(&response.body).ok_or_else(|| {
            ClientError::InvalidResponse("login response did not contain an access token".to_string())
        })?;
        let tokens = AuthTokens::new(grant.access_token, grant.refresh_token);
        self.inner.session.set_tokens(tokens.clone());

        info!(has_refresh_token = tokens.refresh_token.is_some(), "Signed in");
        Ok(tokens)
    }

    /// Sign out: tell the server (best effort), then end the local session.
    pub async fn logout(&self) {
        if let Some(token) = self.inner.session.access_token() {
            let mut request = OutboundRequest::new(Method::POST, self.inner.endpoints.logout_path.as_str());
            if let Ok(value) = format!("Bearer {token}").parse() {
                request.headers.insert(reqwest::header::AUTHORIZATION, value);
            }
            match self.inner.transport.send(request).await {
                Ok(response) if response.status.is_success() => {}
                Ok(response) => warn!(status = %response.status, "Logout request rejected; clearing session anyway"),
                Err(e) => warn!(error = %e, "Logout request failed; clearing session anyway"),
            }
        }

        self.inner.session.clear();
        self.inner.events.logged_out();
        self.inner.events.redirect_to_login(&self.inner.endpoints.login_route);
        info!("Signed out");
    }
}

impl<T: Transport> Inner<T> {
    /// Body of a refresh episode. Runs on the leader only.
    pub(super) async fn perform_refresh(&self) -> RefreshResult {
        match self.request_new_tokens().await {
            Ok(grant) => {
                self.session
                    .replace_access_token(grant.access_token.clone(), grant.refresh_token);
                info!("Access token refreshed");
                Ok(grant.access_token)
            }
            Err(reason) => {
                warn!(reason = %reason, "Token refresh failed; ending session");
                self.end_session();
                Err(ClientError::TokenRefresh(reason))
            }
        }
    }

    /// Plaintext refresh call: no envelope, no bearer token.
    async fn request_new_tokens(&self) -> Result<TokenGrant, String> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or_else(|| "no refresh token available".to_string())?;

        let mut request = OutboundRequest::new(Method::POST, self.endpoints.refresh_path.as_str());
        request.body = Some(json!({ "refreshToken": refresh_token }));

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| format!("refresh request failed: {e}"))?;

        if !response.status.is_success() {
            return Err(response
                .server_message()
                .unwrap_or_else(|| format!("refresh endpoint returned {}", response.status)));
        }

        TokenGrant::from_body(&response.body)
            .ok_or_else(|| "refresh response did not contain an access token".to_string())
    }

    /// Forced logout after an unrecoverable refresh.
    fn end_session(&self) {
        self.session.clear();
        self.notifier.notify(Notice::blocking(SESSION_EXPIRED_MESSAGE));
        self.events.logged_out();
        self.events.redirect_to_login(&self.endpoints.login_route);
    }
}
