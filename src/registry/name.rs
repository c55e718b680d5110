//! Registry and repository names

use crate::error::{Result, TransportError};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_REGISTRY: &str = "index.docker.io";
const DOCKER_HUB_ALIAS: &str = "docker.io";

/// URL scheme used to reach a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(TransportError::InvalidRegistry(format!(
                "unsupported scheme: {}",
                other
            ))),
        }
    }
}

/// Registry host identity, `host[:port]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Registry {
    host: String,
    insecure: bool,
}

impl Registry {
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TransportError::InvalidRegistry(
                "registry name cannot be empty".to_string(),
            ));
        }
        if name.contains("://") || name.contains('/') {
            return Err(TransportError::InvalidRegistry(format!(
                "registry must be a host[:port], got {:?}",
                name
            )));
        }
        // Rejects whitespace, userinfo and invalid ports in one go
        url::Url::parse(&format!("https://{}/", name))
            .map_err(|e| TransportError::InvalidRegistry(format!("{}: {}", name, e)))?;

        let host = if name == DOCKER_HUB_ALIAS {
            DEFAULT_REGISTRY.to_string()
        } else {
            name.to_string()
        };

        Ok(Self {
            host,
            insecure: false,
        })
    }

    /// Registry that may be reached over plain http
    pub fn insecure(name: &str) -> Result<Self> {
        let mut registry = Self::new(name)?;
        registry.insecure = true;
        Ok(registry)
    }

    pub fn registry_str(&self) -> &str {
        &self.host
    }

    pub fn is_insecure(&self) -> bool {
        if self.insecure {
            return true;
        }
        let hostname = crate::transport::host::split_host_port(&self.host).0;
        hostname == "localhost"
            || hostname == "127.0.0.1"
            || hostname == "::1"
            || hostname.ends_with(".local")
    }

    pub fn scheme(&self) -> Scheme {
        if self.is_insecure() {
            Scheme::Http
        } else {
            Scheme::Https
        }
    }

    pub fn catalog_scope(&self) -> String {
        "registry:catalog:*".to_string()
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub registry: Registry,
    pub name: String,
}

impl Repository {
    pub fn new(registry: Registry, name: &str) -> Result<Self> {
        let name = name.trim_matches('/');
        if name.is_empty() {
            return Err(TransportError::InvalidRegistry(
                "Repository name cannot be empty".to_string(),
            ));
        }
        // Official images on Docker Hub live under library/
        let name = if registry.registry_str() == DEFAULT_REGISTRY && !name.contains('/') {
            format!("library/{}", name)
        } else {
            name.to_string()
        };
        Ok(Self { registry, name })
    }

    /// Token scope for `action` on this repository, e.g. `repository:foo:pull`
    pub fn scope(&self, action: &str) -> String {
        format!("repository:{}:{}", self.name, action)
    }
}
