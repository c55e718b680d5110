//! Integration tests for the bearer token exchange
//!
//! A registry mock challenges requests without the expected token, and a separate
//! token service mock implements the token and OAuth2 flows.

use std::sync::Arc;

use registry_bearer_transport::auth::{AuthConfig, Authenticator, Basic, Bearer, from_config};
use registry_bearer_transport::transport::{AuthTarget, BearerTransport, TRANSPORT_NAME, Transport};
use registry_bearer_transport::{Registry, Scheme, TransportError};
use reqwest::{Method, Request, StatusCode};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MANIFEST_PATH: &str = "/v2/foo/manifests/latest";
const SERVICE: &str = "registry.example.com";
const SCOPE: &str = "repository:foo:pull";

fn host_of(server: &MockServer) -> String {
    server.uri().trim_start_matches("http://").to_string()
}

fn bearer_transport(
    registry: &MockServer,
    token_service: &MockServer,
    auth: Arc<dyn Authenticator>,
) -> BearerTransport {
    BearerTransport::new(
        Arc::new(reqwest::Client::new()),
        auth,
        AuthTarget {
            registry: Registry::new(&host_of(registry)).unwrap(),
            realm: format!("{}/token", token_service.uri()),
            service: SERVICE.to_string(),
            scopes: vec![SCOPE.to_string()],
        },
        Scheme::Http,
    )
}

fn get(server: &MockServer, path: &str) -> Request {
    Request::new(Method::GET, format!("{}{}", server.uri(), path).parse().unwrap())
}

/// Registry that serves the manifest only to `Bearer <token>` and challenges everything else
async fn mount_registry(server: &MockServer, token: &str, challenges: u64) {
    Mock::given(method("GET"))
        .and(path(MANIFEST_PATH))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(MANIFEST_PATH))
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            r#"Bearer realm="https://auth.example.com/token",service="registry.example.com""#,
        ))
        .with_priority(2)
        .expect(challenges)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_basic_flow_end_to_end() {
    let registry = MockServer::start().await;
    let token_service = MockServer::start().await;
    mount_registry(&registry, "xyz", 1).await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .and(query_param("scope", SCOPE))
        .and(query_param("service", SERVICE))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"xyz"}"#))
        .expect(1)
        .mount(&token_service)
        .await;

    let bt = bearer_transport(&registry, &token_service, Arc::new(Basic::new("user", "pass")));
    assert!(bt.bearer().unwrap().is_none());

    let response = bt.round_trip(get(&registry, MANIFEST_PATH)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(bt.bearer().unwrap(), Some(Bearer::new("xyz")));
}

#[tokio::test]
async fn test_identity_token_uses_oauth_first() {
    let registry = MockServer::start().await;
    let token_service = MockServer::start().await;
    mount_registry(&registry, "A", 1).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=idtok"))
        .and(body_string_contains("service=registry.example.com"))
        .and(body_string_contains("scope=repository%3Afoo%3Apull"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"access_token":"A","token":"B"}"#),
        )
        .expect(1)
        .mount(&token_service)
        .await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"basic"}"#))
        .expect(0)
        .mount(&token_service)
        .await;

    let auth = from_config(AuthConfig {
        identity_token: "idtok".to_string(),
        ..AuthConfig::default()
    });
    let bt = bearer_transport(&registry, &token_service, auth);

    let response = bt.round_trip(get(&registry, MANIFEST_PATH)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(bt.bearer().unwrap(), Some(Bearer::new("A")));
}

#[tokio::test]
async fn test_password_falls_back_to_oauth() {
    let registry = MockServer::start().await;
    let token_service = MockServer::start().await;
    mount_registry(&registry, "oauth-token", 1).await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&token_service)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=user"))
        .and(body_string_contains("password=pass"))
        .and(body_string_contains("access_type=offline"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"oauth-token"}"#))
        .expect(1)
        .mount(&token_service)
        .await;

    let bt = bearer_transport(&registry, &token_service, Arc::new(Basic::new("user", "pass")));

    let response = bt.round_trip(get(&registry, MANIFEST_PATH)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_both_flows_fail_surfaces_fallback_error() {
    let registry = MockServer::start().await;
    let token_service = MockServer::start().await;
    mount_registry(&registry, "never", 1).await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&token_service)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            concat!(
                r#"{"errors":[{"code":"DENIED","#,
                r#""message":"requested access to the resource is denied"}]}"#
            ),
        ))
        .mount(&token_service)
        .await;

    let bt = bearer_transport(&registry, &token_service, Arc::new(Basic::new("user", "pass")));

    let err = bt.round_trip(get(&registry, MANIFEST_PATH)).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    assert!(err.to_string().contains("DENIED"));
    assert!(bt.bearer().unwrap().is_none());
}

#[tokio::test]
async fn test_second_401_is_returned_without_another_retry() {
    let registry = MockServer::start().await;
    let token_service = MockServer::start().await;
    // The token is never accepted, so both attempts are challenged
    mount_registry(&registry, "accepted", 2).await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"rejected"}"#))
        .expect(1)
        .mount(&token_service)
        .await;

    let bt = bearer_transport(&registry, &token_service, Arc::new(Basic::new("user", "pass")));

    let response = bt.round_trip(get(&registry, MANIFEST_PATH)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(bt.bearer().unwrap(), Some(Bearer::new("rejected")));
}

#[tokio::test]
async fn test_non_401_response_is_returned_unchanged() {
    let registry = MockServer::start().await;
    let token_service = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/missing/manifests/latest"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .expect(1)
        .mount(&registry)
        .await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"t"}"#))
        .expect(0)
        .mount(&token_service)
        .await;

    let bt = bearer_transport(&registry, &token_service, Arc::new(Basic::new("user", "pass")));

    let response = bt
        .round_trip(get(&registry, "/v2/missing/manifests/latest"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "not here");
}

#[tokio::test]
async fn test_missing_token_aborts_without_retry() {
    let registry = MockServer::start().await;
    let token_service = MockServer::start().await;
    mount_registry(&registry, "never", 1).await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&token_service)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&token_service)
        .await;

    let bt = bearer_transport(&registry, &token_service, Arc::new(Basic::new("user", "pass")));

    match bt.round_trip(get(&registry, MANIFEST_PATH)).await {
        Err(TransportError::MissingToken { body }) => assert_eq!(body, "{}"),
        other => panic!("unexpected result: {:?}", other.map(|r| r.status())),
    }
}

#[tokio::test]
async fn test_refresh_token_rotates_long_lived_credential() {
    let registry = MockServer::start().await;
    let token_service = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"token":"first","refresh_token":"R"}"#),
        )
        .expect(1)
        .mount(&token_service)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=R"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"second"}"#))
        .expect(1)
        .mount(&token_service)
        .await;

    let bt = bearer_transport(&registry, &token_service, Arc::new(Basic::new("user", "pass")));

    bt.refresh().await.unwrap();
    assert_eq!(bt.bearer().unwrap(), Some(Bearer::new("first")));

    bt.refresh().await.unwrap();
    assert_eq!(bt.bearer().unwrap(), Some(Bearer::new("second")));

    let posts = token_service
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .collect::<Vec<_>>();
    assert_eq!(posts.len(), 1);
    assert!(!String::from_utf8_lossy(&posts[0].body).contains("password"));
}

#[tokio::test]
async fn test_token_only_sent_to_registry_host() {
    let registry = MockServer::start().await;
    let storage = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(MANIFEST_PATH))
        .and(header("authorization", "Bearer seeded"))
        .and(header("user-agent", TRANSPORT_NAME))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&registry)
        .await;

    Mock::given(method("GET"))
        .and(path("/blobs/sha256:abc"))
        .and(header("user-agent", TRANSPORT_NAME))
        .respond_with(ResponseTemplate::new(200).set_body_string("blob"))
        .expect(1)
        .mount(&storage)
        .await;

    // The storage mock doubles as realm; no refresh is expected
    let bt = bearer_transport(&registry, &storage, Arc::new(Basic::new("user", "pass")))
        .with_bearer(Some(Bearer::new("seeded")));

    let response = bt.round_trip(get(&registry, MANIFEST_PATH)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = bt.round_trip(get(&storage, "/blobs/sha256:abc")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let received = storage.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(!received[0].headers.contains_key("authorization"));
    assert_eq!(received[0].url.scheme(), "http");
}
