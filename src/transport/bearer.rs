//! Bearer token exchange
//!
//! Registries that answer with `WWW-Authenticate: Bearer realm=...,service=...`
//! expect the client to trade its long-lived credential for a short-lived token at
//! the realm, scoped to the resources it needs. [`BearerTransport`] does that trade
//! lazily: it sends requests with whatever token it holds and, on a 401, refreshes
//! the token once and replays the request once.
//!
//! There is no protocol rule saying which exchange a token service implements, so
//! the refresh tries both:
//!
//! - the token flow: `GET realm?scope=...&service=...` with Basic credentials
//!   (<https://docs.docker.com/registry/spec/auth/token/>)
//! - the OAuth2 flow: form `POST realm` with a password or refresh-token grant
//!   (<https://docs.docker.com/registry/spec/auth/oauth/>)
//!
//! A stored identity token means the credential was issued for OAuth2, so that flow
//! goes first; otherwise the token flow does. Whichever goes first, the other one is
//! the fallback.

use crate::auth::{AuthConfig, Authenticator, Bearer, LongLivedCredential, from_config};
use crate::error::{Result, TransportError, check_error};
use crate::registry::{Registry, Scheme};
use crate::transport::basic::BasicTransport;
use crate::transport::host::{canonical_address, url_host};
use crate::transport::{TRANSPORT_NAME, Transport};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HOST, HeaderValue, USER_AGENT};
use reqwest::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use url::{Url, form_urlencoded};

/// Where tokens are requested and what they are requested for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTarget {
    /// Registry that receives the bearer token
    pub registry: Registry,
    /// Token service URL, see <https://tools.ietf.org/html/rfc6750#section-3>
    pub realm: String,
    pub service: String,
    pub scopes: Vec<String>,
}

/// Token acquisition flows, in the order [`flow_order`] picks them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    OAuth2,
    Basic,
}

/// Identity tokens are meant for OAuth2; everything else starts with the token flow.
pub fn flow_order(credential: &LongLivedCredential) -> [Flow; 2] {
    match credential {
        LongLivedCredential::IdentityToken(_) => [Flow::OAuth2, Flow::Basic],
        _ => [Flow::Basic, Flow::OAuth2],
    }
}

/// Token service response. Some registries only set `access_token`.
#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    pub bearer: Bearer,
    pub refresh_token: Option<String>,
}

/// Picks the bearer value out of a token response body, preferring
/// `access_token` over `token`.
pub fn parse_token_response(content: &[u8]) -> Result<ParsedToken> {
    let response: TokenResponse = serde_json::from_slice(content)?;

    let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
    let token = non_empty(response.access_token)
        .or_else(|| non_empty(response.token))
        .ok_or_else(|| TransportError::MissingToken {
            body: String::from_utf8_lossy(content).into_owned(),
        })?;

    Ok(ParsedToken {
        bearer: Bearer::new(token),
        refresh_token: non_empty(response.refresh_token),
    })
}

pub struct BearerTransport {
    inner: Arc<dyn Transport>,
    /// Long-lived credential exchanged for bearer tokens
    basic: RwLock<Arc<dyn Authenticator>>,
    /// Latest token from the token service
    bearer: RwLock<Option<Bearer>>,
    target: AuthTarget,
    /// Scheme the registry answered on during ping
    scheme: Scheme,
}

impl BearerTransport {
    pub fn new(
        inner: Arc<dyn Transport>,
        basic: Arc<dyn Authenticator>,
        target: AuthTarget,
        scheme: Scheme,
    ) -> Self {
        Self {
            inner,
            basic: RwLock::new(basic),
            bearer: RwLock::new(None),
            target,
            scheme,
        }
    }

    /// Starts out with an already issued token
    pub fn with_bearer(self, bearer: Option<Bearer>) -> Self {
        Self {
            bearer: RwLock::new(bearer),
            ..self
        }
    }

    pub fn target(&self) -> &AuthTarget {
        &self.target
    }

    pub fn bearer(&self) -> Result<Option<Bearer>> {
        Ok(self
            .bearer
            .read()
            .map_err(|_| TransportError::Lock("bearer"))?
            .clone())
    }

    fn authenticator(&self) -> Result<Arc<dyn Authenticator>> {
        Ok(self
            .basic
            .read()
            .map_err(|_| TransportError::Lock("authenticator"))?
            .clone())
    }

    /// Whether `request` is headed for the registry, by its `Host` header or
    /// its URL. Redirects are followed above this transport with fresh
    /// requests, so this has to be decided for every request.
    ///
    /// `url` drops a port equal to the default of the URL's own scheme, so
    /// `http://registry:80/x` matches a registry pinged over https and is sent
    /// to `https://registry/x`, on port 443. Non-default ports are kept as
    /// written when the scheme is replaced.
    pub fn matches_registry(&self, request: &Request) -> bool {
        let registry = canonical_address(self.target.registry.registry_str(), self.scheme);

        let header_host = request
            .headers()
            .get(HOST)
            .and_then(|host| host.to_str().ok())
            .map(|host| canonical_address(host, self.scheme));
        let url_host = url_host(request.url()).map(|host| canonical_address(&host, self.scheme));

        header_host.as_deref() == Some(registry.as_str())
            || url_host.as_deref() == Some(registry.as_str())
    }

    async fn send_request(&self, mut request: Request) -> Result<Response> {
        if self.matches_registry(&request) {
            if let Some(bearer) = self.bearer()? {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", bearer.token))
                    .map_err(|e| {
                        TransportError::Credentials(format!("invalid bearer token: {}", e))
                    })?;
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
            }

            // The pinged scheme is only known to be right for the registry itself,
            // not for token servers or blob storage
            if request.url_mut().set_scheme(self.scheme.as_str()).is_err() {
                warn!(
                    url = %request.url(),
                    scheme = %self.scheme,
                    "could not override request scheme"
                );
            }
        }
        request
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static(TRANSPORT_NAME));

        self.inner.round_trip(request).await
    }

    /// Exchanges the long-lived credential for a new bearer token.
    pub async fn refresh(&self) -> Result<()> {
        let auth = self.authenticator()?;
        let config = auth.authorization()?;
        let [first, second] = flow_order(&LongLivedCredential::from(&config));

        let content = match self.fetch(first, &auth, &config).await {
            Ok(content) => content,
            Err(err) => {
                debug!(flow = ?first, error = %err, fallback = ?second, "token flow failed");
                self.fetch(second, &auth, &config).await?
            }
        };

        let parsed = parse_token_response(&content)?;

        // Future refreshes present the rotated refresh token instead of the
        // original password or identity token
        if let Some(refresh_token) = parsed.refresh_token {
            *self
                .basic
                .write()
                .map_err(|_| TransportError::Lock("authenticator"))? = from_config(AuthConfig {
                identity_token: refresh_token,
                ..AuthConfig::default()
            });
        }

        debug!(
            realm = %self.target.realm,
            token_len = parsed.bearer.token.len(),
            "bearer token refreshed"
        );
        *self
            .bearer
            .write()
            .map_err(|_| TransportError::Lock("bearer"))? = Some(parsed.bearer);
        Ok(())
    }

    async fn fetch(
        &self,
        flow: Flow,
        auth: &Arc<dyn Authenticator>,
        config: &AuthConfig,
    ) -> Result<Vec<u8>> {
        match flow {
            Flow::OAuth2 => self.fetch_oauth(config).await,
            Flow::Basic => self.fetch_basic(auth.clone()).await,
        }
    }

    async fn fetch_oauth(&self, config: &AuthConfig) -> Result<Vec<u8>> {
        let mut url = Url::parse(&self.target.realm)?;
        url.set_query(None);

        let body = {
            let mut form = form_urlencoded::Serializer::new(String::new());
            form.append_pair("scope", &self.target.scopes.join(" "))
                .append_pair("service", &self.target.service)
                .append_pair("client_id", TRANSPORT_NAME);
            match LongLivedCredential::from(config) {
                LongLivedCredential::IdentityToken(token) => {
                    form.append_pair("grant_type", "refresh_token")
                        .append_pair("refresh_token", &token);
                }
                LongLivedCredential::Password { username, password } => {
                    form.append_pair("grant_type", "password")
                        .append_pair("username", &username)
                        .append_pair("password", &password)
                        .append_pair("access_type", "offline");
                }
                LongLivedCredential::None => {}
            }
            form.finish()
        };

        debug!(realm = %url, flow = "oauth2", "requesting token");
        let mut request = Request::new(Method::POST, url);
        request.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        *request.body_mut() = Some(body.into());

        let response = self.inner.round_trip(request).await?;
        read_token_body(response).await
    }

    async fn fetch_basic(&self, auth: Arc<dyn Authenticator>) -> Result<Vec<u8>> {
        let mut url = Url::parse(&self.target.realm)?;
        let target = url_host(&url).unwrap_or_default();
        let scheme = url.scheme().parse::<Scheme>()?;
        let client = BasicTransport::new(self.inner.clone(), auth, &target, scheme);

        {
            let mut query = url.query_pairs_mut();
            query.clear();
            for scope in &self.target.scopes {
                query.append_pair("scope", scope);
            }
            query.append_pair("service", &self.target.service);
        }

        debug!(realm = %url, flow = "basic", "requesting token");
        let response = client.round_trip(Request::new(Method::GET, url)).await?;
        read_token_body(response).await
    }
}

/// Requires a 200 and drains the whole body, so the connection is released
/// whatever happens to the content afterwards.
async fn read_token_body(response: Response) -> Result<Vec<u8>> {
    let response = check_error(response, &[StatusCode::OK]).await?;
    Ok(response.bytes().await?.to_vec())
}

#[async_trait]
impl Transport for BearerTransport {
    async fn round_trip(&self, request: Request) -> Result<Response> {
        let url = request.url().to_string();
        let replay = request.try_clone();

        let response = self.send_request(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // The token may have expired, or we never had one
        debug!(%url, "registry answered 401, refreshing bearer token");
        drop(response);
        self.refresh().await?;

        match replay {
            Some(request) => self.send_request(request).await,
            None => Err(TransportError::NotReplayable { url }),
        }
    }
}
