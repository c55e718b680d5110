//! Shared test transports

use std::sync::Mutex;

use async_trait::async_trait;
use registry_bearer_transport::{Result, Transport};
use reqwest::header::AUTHORIZATION;
use reqwest::{Request, Response};

/// What a [`CaptureTransport`] saw of one request
#[derive(Debug, Clone, PartialEq)]
pub struct Captured {
    pub url: String,
    pub authorization: Option<String>,
}

/// Records every request and answers each with an empty 200, without touching
/// the network. Lets tests address arbitrary hosts and schemes.
#[derive(Default)]
pub struct CaptureTransport {
    requests: Mutex<Vec<Captured>>,
}

impl CaptureTransport {
    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for CaptureTransport {
    async fn round_trip(&self, request: Request) -> Result<Response> {
        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .map(|value| value.to_str().unwrap().to_string());
        self.requests.lock().unwrap().push(Captured {
            url: request.url().to_string(),
            authorization,
        });
        Ok(Response::from(http::Response::new(Vec::<u8>::new())))
    }
}
