//! HTTP Basic authentication for a single target host

use crate::auth::Authenticator;
use crate::error::{Result, TransportError};
use crate::registry::Scheme;
use crate::transport::Transport;
use crate::transport::host::{canonical_address, url_host};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Request, Response};
use std::sync::Arc;

pub struct BasicTransport {
    inner: Arc<dyn Transport>,
    auth: Arc<dyn Authenticator>,
    /// Canonical `host:port` that receives the credentials
    target: String,
    scheme: Scheme,
}

impl BasicTransport {
    /// `target` is the `host[:port]` credentials are sent to, with missing ports
    /// taken as the default for `scheme`.
    pub fn new(
        inner: Arc<dyn Transport>,
        auth: Arc<dyn Authenticator>,
        target: &str,
        scheme: Scheme,
    ) -> Self {
        Self {
            inner,
            auth,
            target: canonical_address(target, scheme),
            scheme,
        }
    }

    fn matches_target(&self, url: &url::Url) -> bool {
        url_host(url).is_some_and(|host| canonical_address(&host, self.scheme) == self.target)
    }

    fn authorization_header(&self) -> Result<Option<HeaderValue>> {
        let config = self.auth.authorization()?;

        let value = if !config.registry_token.is_empty() {
            format!("Bearer {}", config.registry_token)
        } else if !config.auth.is_empty() {
            format!("Basic {}", config.auth)
        } else if !config.username.is_empty() || !config.password.is_empty() {
            let encoded = STANDARD.encode(format!("{}:{}", config.username, config.password));
            format!("Basic {}", encoded)
        } else {
            return Ok(None);
        };

        let mut header = HeaderValue::from_str(&value).map_err(|e| {
            TransportError::Credentials(format!("invalid authorization value: {}", e))
        })?;
        header.set_sensitive(true);
        Ok(Some(header))
    }
}

#[async_trait]
impl Transport for BasicTransport {
    async fn round_trip(&self, mut request: Request) -> Result<Response> {
        // Redirects to blob storage must not receive the registry credentials
        if self.matches_target(request.url()) {
            if let Some(header) = self.authorization_header()? {
                request.headers_mut().insert(AUTHORIZATION, header);
            }
        }
        self.inner.round_trip(request).await
    }
}
