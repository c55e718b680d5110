//! Configuration module for credentials and registry settings read from the environment

use crate::auth::AuthConfig;
use std::env;

pub const ENV_USERNAME: &str = "REGISTRY_USERNAME";
pub const ENV_PASSWORD: &str = "REGISTRY_PASSWORD";
pub const ENV_IDENTITY_TOKEN: &str = "REGISTRY_IDENTITY_TOKEN";
pub const ENV_REGISTRY_TOKEN: &str = "REGISTRY_TOKEN";
pub const ENV_INSECURE: &str = "REGISTRY_INSECURE";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub auth: AuthConfig,
    pub insecure: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).unwrap_or_default();
        let insecure = lookup(ENV_INSECURE)
            .map_or(false, |v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

        Config {
            auth: AuthConfig {
                username: var(ENV_USERNAME),
                password: var(ENV_PASSWORD),
                identity_token: var(ENV_IDENTITY_TOKEN),
                registry_token: var(ENV_REGISTRY_TOKEN),
                ..AuthConfig::default()
            },
            insecure,
        }
    }

    /// Applies non-empty command line values on top of the environment
    pub fn merge(
        mut self,
        username: Option<String>,
        password: Option<String>,
        identity_token: Option<String>,
        insecure: bool,
    ) -> Self {
        if let Some(username) = username.filter(|v| !v.is_empty()) {
            self.auth.username = username;
        }
        if let Some(password) = password.filter(|v| !v.is_empty()) {
            self.auth.password = password;
        }
        if let Some(token) = identity_token.filter(|v| !v.is_empty()) {
            self.auth.identity_token = token;
        }
        self.insecure |= insecure;
        self
    }

    pub fn has_auth(&self) -> bool {
        !self.auth.is_empty()
    }
}
