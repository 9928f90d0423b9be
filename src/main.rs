// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `fxdesk-client <METHOD> <PATH> [JSON_BODY]`
//!
//! Sends one request through the secure pipeline and prints the (decrypted)
//! response body as pretty JSON on stdout.

use std::process::ExitCode;

use reqwest::Method;
use serde_json::Value;
use tracing::error;

use fxdesk_client::auth::AuthTokens;
use fxdesk_client::config::{ACCESS_TOKEN_ENV, REFRESH_TOKEN_ENV};
use fxdesk_client::{telemetry, ApiRequest, ClientConfig, ClientError, SecureClient};

const USAGE: &str = "usage: fxdesk-client <GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS> <PATH> [JSON_BODY]";

#[derive(Debug, PartialEq)]
struct Invocation {
    method: Method,
    path: String,
    body: Option<Value>,
}

fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let (method, path, body) = match args {
        [method, path] => (method, path, None),
        [method, path, body] => (method, path, Some(body)),
        _ => return Err(USAGE.to_string()),
    };

    let method = match method.to_ascii_uppercase().as_str() {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "PATCH" => Method::PATCH,
        "DELETE" => Method::DELETE,
        "HEAD" => Method::HEAD,
        "OPTIONS" => Method::OPTIONS,
        other => return Err(format!("unsupported method '{other}'\n{USAGE}")),
    };

    let body = body
        .map(|raw| serde_json::from_str(raw).map_err(|e| format!("body is not valid JSON: {e}")))
        .transpose()?;

    Ok(Invocation {
        method,
        path: path.clone(),
        body,
    })
}

fn env_token(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn run(invocation: Invocation) -> Result<Value, ClientError> {
    let config = ClientConfig::from_env()?;
    let client = SecureClient::from_config(&config)?;

    if let Some(access_token) = env_token(ACCESS_TOKEN_ENV) {
        client
            .session()
            .set_tokens(AuthTokens::new(access_token, env_token(REFRESH_TOKEN_ENV)));
    }

    if client.policy().is_enabled() {
        client.warm_up().await;
    }

    let mut request = ApiRequest::new(invocation.method, invocation.path);
    if let Some(body) = invocation.body {
        request = request.body(body);
    }
    Ok(client.send(request).await?.body)
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = telemetry::init_tracing() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    match run(invocation).await {
        Ok(body) => {
            let rendered = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
            println!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(code = e.error_code(), error = %e, "Request failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
