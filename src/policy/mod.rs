// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Encryption Policy
//!
//! Decides, per outgoing request, whether the body goes out in an envelope.
//!
//! A request is encrypted when all of the following hold:
//!
//! 1. Encryption is globally enabled
//! 2. The method is one of GET, POST, PUT, PATCH, DELETE
//! 3. The caller did not opt out for this request
//! 4. No endpoint rule and no skip pattern covers the target
//!
//! Auth endpoints stay in plaintext: the refresh call in particular must not
//! depend on the key material it may be needed to recover.

pub mod path;
pub mod rules;

use regex::Regex;
use tracing::debug;

pub use path::{matches_endpoint_rule, normalize_path};
pub use rules::{default_rules, validate_rules, EndpointRule, MatchType};

use crate::error::ClientError;

/// Path families that never carry an envelope.
pub const DEFAULT_SKIP_PATTERNS: &[&str] = &[
    r"/public/",
    r"/health(?:[/?]|$)",
    r"/download/",
    r"/export/",
    r"/webhook/",
    r"/callback/",
];

const ENCRYPTABLE_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Validated, immutable encryption policy.
#[derive(Debug, Clone)]
pub struct EncryptionPolicy {
    enabled: bool,
    rules: Vec<EndpointRule>,
    skip_patterns: Vec<Regex>,
}

impl EncryptionPolicy {
    /// Build a policy from a rule table and regex skip patterns.
    pub fn new<S: AsRef<str>>(rules: Vec<EndpointRule>, patterns: &[S]) -> Result<Self, ClientError> {
        let rules = validate_rules(rules)?;
        let skip_patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    ClientError::Config(format!("invalid skip pattern '{}': {e}", p.as_ref()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enabled: true,
            rules,
            skip_patterns,
        })
    }

    /// Default rules and skip patterns.
    pub fn standard() -> Result<Self, ClientError> {
        Self::new(default_rules(), DEFAULT_SKIP_PATTERNS)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Make sure the given endpoints are never encrypted.
    ///
    /// Endpoints already covered by a rule are left alone; the rest are
    /// added as exact-only rules.
    pub fn with_mandatory_skips<S: AsRef<str>>(mut self, endpoints: &[S]) -> Self {
        for endpoint in endpoints {
            let endpoint = normalize_path(endpoint.as_ref());
            if endpoint.is_empty() || self.rules.iter().any(|r| r.endpoint == endpoint) {
                continue;
            }
            self.rules.push(EndpointRule::exact_only(endpoint));
        }
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn rules(&self) -> &[EndpointRule] {
        &self.rules
    }

    /// Whether an endpoint rule or skip pattern covers `url`.
    pub fn should_skip_encryption(&self, url: &str) -> bool {
        if self.rules.iter().any(|rule| matches_endpoint_rule(url, rule)) {
            return true;
        }
        // Patterns describe path families; a query value must not match them.
        let normalized = normalize_path(url);
        let path = normalized.split('?').next().unwrap_or_default();
        let rooted = format!("/{path}");
        self.skip_patterns.iter().any(|p| p.is_match(&rooted))
    }

    pub fn should_encrypt_method(&self, method: &str) -> bool {
        ENCRYPTABLE_METHODS
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Final decision for one request.
    pub fn should_encrypt(&self, method: &str, url: &str, opted_out: bool) -> bool {
        let encrypt = self.enabled
            && !opted_out
            && self.should_encrypt_method(method)
            && !self.should_skip_encryption(url);
        debug!(method = %method, url = %url, encrypt, "Encryption policy evaluated");
        encrypt
    }
}
