//! HTTP transports that authenticate requests to a registry
//!
//! Every transport wraps an inner [`Transport`] and decorates the requests that
//! pass through it. The stack is assembled by [`new_transport`] from the
//! registry's answer to a preflight ping:
//!
//! - anonymous registries get the inner transport unchanged
//! - `Basic` challenges get a [`BasicTransport`]
//! - `Bearer` challenges get a [`BearerTransport`], which exchanges the long-lived
//!   credential for a scoped token whenever the registry answers 401

pub mod basic;
pub mod bearer;
pub mod host;
pub mod ping;

use crate::auth::{Authenticator, Bearer};
use crate::error::{Result, TransportError};
use crate::registry::Registry;
use async_trait::async_trait;
use reqwest::{Request, Response};
use std::sync::Arc;
use tracing::debug;

pub use basic::BasicTransport;
pub use bearer::{AuthTarget, BearerTransport, Flow};
pub use ping::{Challenge, PingResponse, ping};

/// Identifier sent as `User-Agent` and as the OAuth2 `client_id`
pub const TRANSPORT_NAME: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Raw HTTP exchange
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn round_trip(&self, request: Request) -> Result<Response> {
        self.execute(request).await.map_err(TransportError::from)
    }
}

/// Pings `registry` and wraps `inner` with whatever authentication its
/// challenge asks for.
pub async fn new_transport(
    registry: &Registry,
    auth: Arc<dyn Authenticator>,
    inner: Arc<dyn Transport>,
    scopes: Vec<String>,
) -> Result<Arc<dyn Transport>> {
    let pr = ping(registry, inner.as_ref()).await?;
    from_ping(registry, auth, inner, scopes, pr)
}

/// Wraps `inner` according to an already obtained ping response.
pub fn from_ping(
    registry: &Registry,
    auth: Arc<dyn Authenticator>,
    inner: Arc<dyn Transport>,
    scopes: Vec<String>,
    pr: PingResponse,
) -> Result<Arc<dyn Transport>> {
    match pr.challenge {
        Challenge::Anonymous => Ok(inner),
        Challenge::Basic => Ok(Arc::new(BasicTransport::new(
            inner,
            auth,
            registry.registry_str(),
            pr.scheme,
        ))),
        Challenge::Bearer => {
            let realm = pr.parameters.get("realm").cloned().ok_or_else(|| {
                TransportError::Challenge(format!(
                    "malformed www-authenticate, missing realm: {:?}",
                    pr.parameters
                ))
            })?;
            let service = pr
                .parameters
                .get("service")
                .cloned()
                .unwrap_or_else(|| registry.registry_str().to_string());

            // A token stored alongside the credentials can be used straight away
            let seeded = auth.authorization()?.registry_token;
            let bearer = (!seeded.is_empty()).then(|| Bearer::new(seeded));

            debug!(registry = %registry, %realm, %service, "registry requires bearer tokens");
            let target = AuthTarget {
                registry: registry.clone(),
                realm,
                service,
                scopes,
            };
            Ok(Arc::new(
                BearerTransport::new(inner, auth, target, pr.scheme).with_bearer(bearer),
            ))
        }
    }
}
