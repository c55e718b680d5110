//! Error types and handlers for registry token exchange

pub mod handlers;

use reqwest::StatusCode;
use thiserror::Error;

pub use handlers::{Diagnostic, check_error};

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The credential provider could not produce authorization materials
    #[error("Credential error: {0}")]
    Credentials(String),
    /// Realm URL from the registry challenge could not be parsed
    #[error("Invalid realm: {0}")]
    InvalidRealm(#[from] url::ParseError),
    /// Transport level failures
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Unexpected status from a registry or token endpoint
    #[error("{}", handlers::describe_status(.status, .errors, .body))]
    Status {
        status: StatusCode,
        body: String,
        errors: Vec<Diagnostic>,
    },
    /// Token endpoint answered 200 without any usable token field
    #[error("no token in bearer response:\n{body}")]
    MissingToken { body: String },
    /// Token endpoint body was not the expected JSON
    #[error("Failed to decode token response: {0}")]
    Decode(#[from] serde_json::Error),
    /// Malformed or unsupported WWW-Authenticate challenge
    #[error("Challenge error: {0}")]
    Challenge(String),
    #[error("Invalid registry: {0}")]
    InvalidRegistry(String),
    /// The request body is streamed and cannot be sent a second time
    #[error("Request to {url} cannot be replayed after token refresh")]
    NotReplayable { url: String },
    #[error("Failed to acquire {0} lock")]
    Lock(&'static str),
}

impl TransportError {
    /// Status code carried by the error, if it came from an HTTP response
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Network(err) => err.status(),
            _ => None,
        }
    }
}
