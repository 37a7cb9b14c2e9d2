//! Reqwest-based implementation of the `GatewayFetcher` trait.
//!
//! Provides a thin adapter around `reqwest::Client` that converts between the
//! request/response values used by the core and the concrete transport.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use super::{FetchError, FetchRequest, FetchResponse, GatewayFetcher};

/// Reqwest-backed fetcher with a cookie store, so a gateway session survives
/// across the challenge, image and submission requests.
pub struct ReqwestGatewayFetcher {
    client: Client,
}

impl ReqwestGatewayFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client, e.g. one already holding a logged-in
    /// session.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GatewayFetcher for ReqwestGatewayFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str());

        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| map_error(err, &request))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| map_error(err, &request))?;

        Ok(FetchResponse { status, body })
    }
}

fn map_error(err: reqwest::Error, request: &FetchRequest) -> FetchError {
    match request.timeout {
        Some(timeout) if err.is_timeout() => FetchError::Timeout(timeout),
        _ => FetchError::Transport(err.to_string()),
    }
}

type _AssertSync = Arc<ReqwestGatewayFetcher>;
