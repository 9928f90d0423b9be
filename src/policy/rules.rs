// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Endpoint rule table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::path::normalize_path;
use crate::error::ClientError;

/// How an [`EndpointRule`] compares against a request target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchType {
    /// The target must equal the endpoint.
    ExactOnly,
    /// The endpoint and everything below it.
    Standard,
}

/// An endpoint excluded from envelope encryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRule {
    pub endpoint: String,
    pub match_type: MatchType,
}

impl EndpointRule {
    pub fn exact_only(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            match_type: MatchType::ExactOnly,
        }
    }

    pub fn standard(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            match_type: MatchType::Standard,
        }
    }
}

/// Built-in rule table for the FX back-office API.
pub fn default_rules() -> Vec<EndpointRule> {
    vec![
        EndpointRule::exact_only("users/login"),
        EndpointRule::exact_only("users/logout"),
        EndpointRule::exact_only("users/refresh-token"),
        EndpointRule::standard("users/forgot-password"),
        EndpointRule::standard("users/reset-password"),
        EndpointRule::standard("orders/search"),
        EndpointRule::standard("incidents/list"),
        EndpointRule::standard("partners/search"),
        EndpointRule::exact_only("masters/documents/list"),
    ]
}

/// Check a rule table once at start-up.
///
/// Empty endpoints and an endpoint listed under two match types are
/// configuration errors. Exact duplicates are collapsed. Endpoints are
/// stored in normalised form.
pub fn validate_rules(rules: Vec<EndpointRule>) -> Result<Vec<EndpointRule>, ClientError> {
    let mut seen: HashMap<String, MatchType> = HashMap::new();
    let mut validated = Vec::with_capacity(rules.len());

    for rule in rules {
        let endpoint = normalize_path(&rule.endpoint);
        if endpoint.is_empty() {
            return Err(ClientError::Config(format!(
                "endpoint rule '{}' is empty after normalisation",
                rule.endpoint
            )));
        }

        match seen.get(&endpoint) {
            Some(existing) if *existing == rule.match_type => continue,
            Some(existing) => {
                return Err(ClientError::Config(format!(
                    "endpoint '{endpoint}' listed as both {existing:?} and {:?}",
                    rule.match_type
                )));
            }
            None => {
                seen.insert(endpoint.clone(), rule.match_type);
                validated.push(EndpointRule {
                    endpoint,
                    match_type: rule.match_type,
                });
            }
        }
    }

    Ok(validated)
}
