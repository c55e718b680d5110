//! Registry preflight probe
//!
//! `GET /v2/` tells us which scheme the registry answers on and, through the
//! `WWW-Authenticate` header of a 401, how it wants to be authenticated.

use crate::error::handlers::{read_error_body, status_error};
use crate::error::{Result, TransportError};
use crate::registry::{Registry, Scheme};
use crate::transport::Transport;
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::{Method, Request, Response, StatusCode};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Challenge {
    Anonymous,
    Basic,
    Bearer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResponse {
    pub scheme: Scheme,
    pub challenge: Challenge,
    /// Challenge parameters with lower-cased keys, e.g. `realm`, `service`
    pub parameters: HashMap<String, String>,
}

/// Probes `registry` over https, falling back to http for insecure registries.
pub async fn ping(registry: &Registry, inner: &dyn Transport) -> Result<PingResponse> {
    let schemes: &[Scheme] = if registry.is_insecure() {
        &[Scheme::Https, Scheme::Http]
    } else {
        &[Scheme::Https]
    };

    let mut last_error = None;
    for &scheme in schemes {
        let url = format!("{}://{}/v2/", scheme, registry.registry_str());
        let url = url::Url::parse(&url)
            .map_err(|e| TransportError::InvalidRegistry(format!("{}: {}", url, e)))?;

        debug!(registry = %registry, %scheme, "pinging registry");
        match inner.round_trip(Request::new(Method::GET, url)).await {
            Ok(response) => return classify(scheme, response).await,
            Err(err) => {
                debug!(registry = %registry, %scheme, error = %err, "ping failed");
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        TransportError::InvalidRegistry(format!("no scheme to ping {}", registry))
    }))
}

async fn classify(scheme: Scheme, response: Response) -> Result<PingResponse> {
    match response.status() {
        StatusCode::OK => Ok(PingResponse {
            scheme,
            challenge: Challenge::Anonymous,
            parameters: HashMap::new(),
        }),
        StatusCode::UNAUTHORIZED => {
            let header = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .ok_or_else(|| {
                    TransportError::Challenge("401 without WWW-Authenticate header".to_string())
                })?
                .to_str()
                .map_err(|e| TransportError::Challenge(format!("Invalid auth header: {}", e)))?;

            debug!(header, "parsing auth challenge");
            let (challenge, parameters) = parse_challenge(header)?;
            Ok(PingResponse {
                scheme,
                challenge,
                parameters,
            })
        }
        status => {
            Err(status_error(status, read_error_body(response).await))
        }
    }
}

/// Parses `Bearer realm="...",service="...",scope="..."` style headers.
pub fn parse_challenge(header: &str) -> Result<(Challenge, HashMap<String, String>)> {
    let header = header.trim();
    let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));

    let challenge = match scheme.to_ascii_lowercase().as_str() {
        "basic" => Challenge::Basic,
        "bearer" => Challenge::Bearer,
        other => {
            return Err(TransportError::Challenge(format!(
                "unsupported challenge scheme: {}",
                other
            )));
        }
    };

    Ok((challenge, parse_params(params)))
}

fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim_start();

    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            // Quoted values may contain commas and backslash escapes
            let mut value = String::new();
            let mut end = quoted.len();
            let mut escaped = false;
            for (i, c) in quoted.char_indices() {
                if escaped {
                    value.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    end = i + 1;
                    break;
                } else {
                    value.push(c);
                }
            }
            rest = &quoted[end..];
            value
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = &rest[end..];
            value
        };

        if !key.is_empty() {
            params.insert(key, value);
        }
        rest = rest.trim_start().trim_start_matches(',').trim_start();
    }

    params
}
