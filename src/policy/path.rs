// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! URL normalisation shared by every rule comparison.

use url::Url;

use super::rules::{EndpointRule, MatchType};

/// Reduce a request target to `segment/segment[?query]`.
///
/// Absolute URLs lose their scheme and authority, fragments are dropped,
/// repeated slashes collapse and leading/trailing slashes are stripped.
/// The query string is kept verbatim.
pub fn normalize_path(url: &str) -> String {
    let trimmed = url.trim();
    let (path, query) = match Url::parse(trimmed) {
        Ok(parsed) if parsed.has_host() => (
            parsed.path().to_string(),
            parsed.query().map(str::to_string),
        ),
        _ => {
            let without_fragment = trimmed.split('#').next().unwrap_or_default();
            match without_fragment.split_once('?') {
                Some((path, query)) => (path.to_string(), Some(query.to_string())),
                None => (without_fragment.to_string(), None),
            }
        }
    };

    let mut normalized = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if let Some(query) = query.filter(|q| !q.is_empty()) {
        normalized.push('?');
        normalized.push_str(&query);
    }
    normalized
}

/// Whether `url` is covered by `rule`.
///
/// `exact-only` needs the normalised forms to be equal; `standard` also
/// accepts targets that continue with a `/` or `?` right after the endpoint.
pub fn matches_endpoint_rule(url: &str, rule: &EndpointRule) -> bool {
    let endpoint = normalize_path(&rule.endpoint);
    if endpoint.is_empty() {
        return false;
    }
    let target = normalize_path(url);

    match rule.match_type {
        MatchType::ExactOnly => target == endpoint,
        MatchType::Standard => {
            target == endpoint
                || target
                    .strip_prefix(endpoint.as_str())
                    .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('?'))
        }
    }
}
