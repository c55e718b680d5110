//! Classification of unexpected registry responses

use crate::error::{Result, TransportError};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Single entry of the registry error envelope `{"errors": [...]}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Diagnostic {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) if !detail.is_null() => {
                write!(f, "{}: {}; {}", self.code, self.message, detail)
            }
            _ => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<Diagnostic>,
}

/// Returns the response untouched when its status is one of `expected`.
///
/// Otherwise the body is drained and turned into [`TransportError::Status`],
/// with the registry's structured diagnostics attached when the body carries them.
pub async fn check_error(response: Response, expected: &[StatusCode]) -> Result<Response> {
    let status = response.status();
    if expected.contains(&status) {
        return Ok(response);
    }

    let body = read_error_body(response).await;
    Err(status_error(status, body))
}

/// Drains an error response. A body that cannot be read is reported in its
/// place, so the status error still says why the details are missing.
pub(crate) async fn read_error_body(response: Response) -> String {
    let status = response.status();
    response.text().await.unwrap_or_else(|e| {
        debug!(%status, error = %e, "failed to read error response body");
        format!("Failed to read error response: {}", e)
    })
}

/// Builds the error for an unexpected `status` from an already drained body.
pub fn status_error(status: StatusCode, body: String) -> TransportError {
    let errors = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.errors)
        .unwrap_or_default();

    TransportError::Status { status, body, errors }
}

pub(crate) fn describe_status(status: &StatusCode, errors: &[Diagnostic], body: &str) -> String {
    let hint = match status.as_u16() {
        401 => "Invalid or missing credentials",
        403 => "Access denied - insufficient permissions",
        404 => "Endpoint not found",
        429 => "Too many requests",
        500..=599 => "Registry server error",
        _ => "Unexpected status",
    };

    let detail = if errors.is_empty() {
        body.trim().to_string()
    } else {
        errors
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    };

    if detail.is_empty() {
        format!("{} (status {})", hint, status)
    } else {
        format!("{} (status {}): {}", hint, status, detail)
    }
}
