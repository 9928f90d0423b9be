// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! by the client. Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `FXDESK_API_BASE_URL` | Back-office API base URL | Required |
//! | `FXDESK_PUBLIC_KEY_PATH` | Server RSA public key endpoint | `/encryption/public-key` |
//! | `FXDESK_LOGIN_PATH` | Login endpoint | `/users/login` |
//! | `FXDESK_LOGOUT_PATH` | Logout endpoint | `/users/logout` |
//! | `FXDESK_REFRESH_PATH` | Token refresh endpoint | `/users/refresh-token` |
//! | `FXDESK_LOGIN_ROUTE` | UI route used for forced re-login | `/login` |
//! | `FXDESK_REQUEST_TIMEOUT_SECS` | Per-request timeout in seconds | `30` |
//! | `FXDESK_ENCRYPTION_ENABLED` | Global envelope switch | `true` |
//! | `FXDESK_ENDPOINT_RULES_PATH` | JSON file replacing the built-in endpoint rules | Optional |
//! | `FXDESK_ACCESS_TOKEN` | Access token seeded into the CLI session | Optional |
//! | `FXDESK_REFRESH_TOKEN` | Refresh token seeded into the CLI session | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,fxdesk_client=debug` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::ClientError;
use crate::policy::{default_rules, EncryptionPolicy, EndpointRule, DEFAULT_SKIP_PATTERNS};

/// Environment variable name for the API base URL.
pub const API_BASE_URL_ENV: &str = "FXDESK_API_BASE_URL";

/// Environment variable name for the public key endpoint.
pub const PUBLIC_KEY_PATH_ENV: &str = "FXDESK_PUBLIC_KEY_PATH";

pub const LOGIN_PATH_ENV: &str = "FXDESK_LOGIN_PATH";

pub const LOGOUT_PATH_ENV: &str = "FXDESK_LOGOUT_PATH";

pub const REFRESH_PATH_ENV: &str = "FXDESK_REFRESH_PATH";

/// Route the host UI navigates to when the session cannot be recovered.
pub const LOGIN_ROUTE_ENV: &str = "FXDESK_LOGIN_ROUTE";

/// Environment variable name for the request timeout, in whole seconds.
pub const REQUEST_TIMEOUT_ENV: &str = "FXDESK_REQUEST_TIMEOUT_SECS";

/// Environment variable name for the global encryption switch.
///
/// Accepts `true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off`.
pub const ENCRYPTION_ENABLED_ENV: &str = "FXDESK_ENCRYPTION_ENABLED";

/// Environment variable name for a JSON endpoint rule file.
///
/// The file holds an array of `{"endpoint": "...", "matchType": "exact-only" | "standard"}`.
pub const ENDPOINT_RULES_PATH_ENV: &str = "FXDESK_ENDPOINT_RULES_PATH";

/// Session seed for the command-line client.
pub const ACCESS_TOKEN_ENV: &str = "FXDESK_ACCESS_TOKEN";

pub const REFRESH_TOKEN_ENV: &str = "FXDESK_REFRESH_TOKEN";

/// Environment variable name for the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,fxdesk_client=debug";

const DEFAULT_PUBLIC_KEY_PATH: &str = "/encryption/public-key";
const DEFAULT_LOGIN_PATH: &str = "/users/login";
const DEFAULT_LOGOUT_PATH: &str = "/users/logout";
const DEFAULT_REFRESH_PATH: &str = "/users/refresh-token";
const DEFAULT_LOGIN_ROUTE: &str = "/login";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Well-known endpoints and routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub public_key_path: String,
    pub login_path: String,
    pub logout_path: String,
    pub refresh_path: String,
    pub login_route: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            public_key_path: DEFAULT_PUBLIC_KEY_PATH.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            logout_path: DEFAULT_LOGOUT_PATH.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
        }
    }
}

impl Endpoints {
    /// Auth endpoints that must always travel in plaintext.
    pub fn plaintext_endpoints(&self) -> [&str; 3] {
        [&self.login_path, &self.logout_path, &self.refresh_path]
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub endpoints: Endpoints,
    pub request_timeout: Duration,
    pub encryption_enabled: bool,
    pub endpoint_rules_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Defaults for everything except the base URL.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            endpoints: Endpoints::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            encryption_enabled: true,
            endpoint_rules_path: None,
        }
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let api_base_url = env.required(API_BASE_URL_ENV)?;
        let parsed = Url::parse(&api_base_url)
            .map_err(|e| ClientError::Config(format!("{API_BASE_URL_ENV} is not a valid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "{API_BASE_URL_ENV} must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        let endpoints = Endpoints {
            public_key_path: env.or_default(PUBLIC_KEY_PATH_ENV, DEFAULT_PUBLIC_KEY_PATH),
            login_path: env.or_default(LOGIN_PATH_ENV, DEFAULT_LOGIN_PATH),
            logout_path: env.or_default(LOGOUT_PATH_ENV, DEFAULT_LOGOUT_PATH),
            refresh_path: env.or_default(REFRESH_PATH_ENV, DEFAULT_REFRESH_PATH),
            login_route: env.or_default(LOGIN_ROUTE_ENV, DEFAULT_LOGIN_ROUTE),
        };

        let request_timeout = match env.optional(REQUEST_TIMEOUT_ENV) {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    ClientError::Config(format!("{REQUEST_TIMEOUT_ENV} must be a whole number of seconds, got '{raw}'"))
                })?;
                if secs == 0 {
                    return Err(ClientError::Config(format!("{REQUEST_TIMEOUT_ENV} must be greater than zero")));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        let encryption_enabled = match env.optional(ENCRYPTION_ENABLED_ENV) {
            Some(raw) => parse_bool(ENCRYPTION_ENABLED_ENV, &raw)?,
            None => true,
        };

        Ok(Self {
            api_base_url,
            endpoints,
            request_timeout,
            encryption_enabled,
            endpoint_rules_path: env.optional(ENDPOINT_RULES_PATH_ENV).map(PathBuf::from),
        })
    }

    /// Build the encryption policy this configuration describes.
    ///
    /// Auth endpoints are always added as plaintext, whatever the rule file says.
    pub fn load_policy(&self) -> Result<EncryptionPolicy, ClientError> {
        let rules = match &self.endpoint_rules_path {
            Some(path) => load_rules_file(path)?,
            None => default_rules(),
        };
        Ok(EncryptionPolicy::new(rules, DEFAULT_SKIP_PATTERNS)?
            .with_enabled(self.encryption_enabled)
            .with_mandatory_skips(&self.endpoints.plaintext_endpoints()))
    }
}

/// Read an endpoint rule table from a JSON file.
pub fn load_rules_file(path: &Path) -> Result<Vec<EndpointRule>, ClientError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ClientError::Config(format!("failed to read endpoint rules {}: {e}", path.display()))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        ClientError::Config(format!("invalid endpoint rules in {}: {e}", path.display()))
    })
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ClientError> {
        self.optional(name)
            .ok_or_else(|| ClientError::Config(format!("{name} is required")))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ClientError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ClientError::Config(format!("{name} must be a boolean, got '{raw}'"))),
    }
}
