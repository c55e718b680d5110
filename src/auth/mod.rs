//! Long-lived registry credentials and the bearer credential they are exchanged for
//!
//! Credentials are handed to the transports through the [`Authenticator`] trait, so
//! that a credential store, a docker config file or a plain username/password pair
//! all look the same to the token exchange.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Authorization materials, using the field names of a docker config auth entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Pre-encoded `base64(username:password)`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth: String,
    /// OAuth2 refresh token
    #[serde(default, rename = "identitytoken", skip_serializing_if = "String::is_empty")]
    pub identity_token: String,
    /// Bearer token to present to the registry as-is
    #[serde(default, rename = "registrytoken", skip_serializing_if = "String::is_empty")]
    pub registry_token: String,
}

impl AuthConfig {
    pub fn is_empty(&self) -> bool {
        self == &AuthConfig::default()
    }
}

/// Source of authorization materials for a registry
pub trait Authenticator: Send + Sync {
    fn authorization(&self) -> Result<AuthConfig>;
}

/// No credentials at all
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl Authenticator for Anonymous {
    fn authorization(&self) -> Result<AuthConfig> {
        Ok(AuthConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct Basic {
    pub username: String,
    pub password: String,
}

impl Basic {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Authenticator for Basic {
    fn authorization(&self) -> Result<AuthConfig> {
        Ok(AuthConfig {
            username: self.username.clone(),
            password: self.password.clone(),
            ..AuthConfig::default()
        })
    }
}

/// Short-lived token presented via `Authorization: Bearer`
#[derive(Clone, PartialEq, Eq)]
pub struct Bearer {
    pub token: String,
}

impl Bearer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for Bearer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bearer")
            .field("token", &format_args!("<{} chars>", self.token.len()))
            .finish()
    }
}

impl Authenticator for Bearer {
    fn authorization(&self) -> Result<AuthConfig> {
        Ok(AuthConfig {
            registry_token: self.token.clone(),
            ..AuthConfig::default()
        })
    }
}

/// Fixed authorization materials
#[derive(Debug, Clone)]
pub struct FromConfig(pub AuthConfig);

impl Authenticator for FromConfig {
    fn authorization(&self) -> Result<AuthConfig> {
        Ok(self.0.clone())
    }
}

/// Wraps a fixed [`AuthConfig`] as a shareable authenticator
pub fn from_config(config: AuthConfig) -> Arc<dyn Authenticator> {
    Arc::new(FromConfig(config))
}

/// Which kind of long-lived secret an [`AuthConfig`] carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LongLivedCredential {
    IdentityToken(String),
    Password { username: String, password: String },
    None,
}

impl From<&AuthConfig> for LongLivedCredential {
    fn from(config: &AuthConfig) -> Self {
        if !config.identity_token.is_empty() {
            LongLivedCredential::IdentityToken(config.identity_token.clone())
        } else if !config.username.is_empty() && !config.password.is_empty() {
            LongLivedCredential::Password {
                username: config.username.clone(),
                password: config.password.clone(),
            }
        } else {
            LongLivedCredential::None
        }
    }
}
