// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ordered request and response stages.
//!
//! Every attempt runs [`REQUEST_STAGES`] in order on the way out and
//! [`RESPONSE_STAGES`] on the way back. The order is fixed: the body is
//! sealed before the bearer token is attached, so a failed key fetch never
//! leaves a half-prepared request behind.

use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use super::request::{ApiRequest, ApiResponse, OutboundRequest};
use super::transport::Transport;
use super::Inner;
use crate::envelope::{build_envelope, open_envelope, ResponseEnvelope, SymmetricKey};
use crate::error::ClientError;
use crate::keys::PublicKeyMaterial;

/// Outgoing stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    /// In: plaintext request. Out: body replaced by an envelope and the
    /// symmetric key kept in the [`Exchange`], when the policy asks for it.
    Encrypt,
    /// In: request. Out: `Authorization: Bearer` attached when a session exists.
    Authorize,
}

/// Incoming stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStage {
    /// In: raw response. Out: body opened with the exchange key when the
    /// request was encrypted and the body has the envelope shape.
    Decrypt,
}

pub const REQUEST_STAGES: [RequestStage; 2] = [RequestStage::Encrypt, RequestStage::Authorize];

pub const RESPONSE_STAGES: [ResponseStage; 1] = [ResponseStage::Decrypt];

/// One attempt of a request: what goes out plus what is needed to read the answer.
#[derive(Debug)]
pub struct Exchange {
    pub request: OutboundRequest,
    /// Present only when the body went out sealed.
    pub symmetric_key: Option<SymmetricKey>,
    /// Access token attached to this attempt.
    pub bearer: Option<String>,
}

impl<T: Transport> Inner<T> {
    /// Run the request stages for a fresh attempt.
    ///
    /// Each call generates new key material, so a replay never reuses the
    /// envelope of the attempt it replaces.
    pub(super) async fn prepare(&self, request: &ApiRequest) -> Result<Exchange, ClientError> {
        let encrypt = self.policy.should_encrypt(
            request.method().as_str(),
            &request.target(),
            request.opted_out(),
        );

        let mut exchange = Exchange {
            request: request.to_outbound(),
            symmetric_key: None,
            bearer: None,
        };

        for stage in REQUEST_STAGES {
            match stage {
                RequestStage::Encrypt if encrypt => self.seal(&mut exchange).await?,
                RequestStage::Encrypt => {}
                RequestStage::Authorize => self.authorize(&mut exchange),
            }
        }

        Ok(exchange)
    }

    /// Run the response stages.
    pub(super) fn open(
        &self,
        key: Option<&SymmetricKey>,
        response: &mut ApiResponse,
    ) -> Result<(), ClientError> {
        for stage in RESPONSE_STAGES {
            match stage {
                ResponseStage::Decrypt => match (key, ResponseEnvelope::detect(&response.body)) {
                    (Some(key), Some(envelope)) => response.body = open_envelope(&envelope, key)?,
                    (None, Some(_)) => debug!(
                        status = %response.status,
                        "Encrypted response to a request sent without a key; passing it through"
                    ),
                    (_, None) => {}
                },
            }
        }
        Ok(())
    }

    async fn seal(&self, exchange: &mut Exchange) -> Result<(), ClientError> {
        // Nothing to seal; the response comes back in plaintext.
        let Some(body) = exchange.request.body.as_ref() else {
            return Ok(());
        };

        let public_key: Arc<PublicKeyMaterial> = self.ensure_public_key().await?;
        let sealed = build_envelope(body, Some(&*public_key))?;
        let envelope = serde_json::to_value(&sealed.envelope)
            .map_err(|e| ClientError::Encryption(format!("envelope is not serialisable: {e}")))?;

        exchange.request.body = Some(envelope);
        exchange
            .request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        exchange.symmetric_key = Some(sealed.symmetric_key);

        debug!(
            request_id = %exchange.request.request_id,
            fingerprint = %public_key.fingerprint(),
            "Request body sealed"
        );
        Ok(())
    }

    fn authorize(&self, exchange: &mut Exchange) {
        let Some(token) = self.session.access_token() else {
            return;
        };
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(value) => {
                exchange.request.headers.insert(AUTHORIZATION, value);
                exchange.bearer = Some(token);
            }
            Err(_) => debug!("Access token is not a valid header value; sending without it"),
        }
    }
}
