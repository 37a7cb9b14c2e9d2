//! Capabilities the core borrows from its host application.
//!
//! The captcha resolver never talks HTTP itself. It hands [`FetchRequest`]s to
//! a [`GatewayFetcher`] and learns the gateway's hostname from a
//! [`HostResolver`], so sessions, cookies, proxies and retries stay with the
//! caller.

pub mod reqwest_client;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub use reqwest_client::ReqwestGatewayFetcher;

/// Request handed to the fetch capability.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    /// Form fields sent urlencoded in the body; empty for GET requests.
    pub form: Vec<(String, String)>,
    /// Upper bound the fetcher should enforce for the whole exchange.
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            form: Vec::new(),
            timeout: None,
        }
    }

    pub fn post_form<K, V>(url: Url, form: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            method: Method::POST,
            url,
            form: form
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Value of a form field, if present.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body returned by the fetch capability.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Transport-level failures reported by a fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("http transport error: {0}")]
    Transport(String),
}

/// Performs HTTP exchanges on behalf of the core.
///
/// Implementations own session state (cookies, challenge clearance) and
/// enforce [`FetchRequest::timeout`].
#[async_trait]
pub trait GatewayFetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// Resolves a site identifier to the hostname currently configured for it.
pub trait HostResolver: Send + Sync {
    fn hostname(&self, site: &str) -> Option<String>;
}

impl HostResolver for HashMap<String, String> {
    fn hostname(&self, site: &str) -> Option<String> {
        self.get(site).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_form_keeps_field_order() {
        let url = Url::parse("https://gate.example/files/captcha").unwrap();
        let request = FetchRequest::post_form(url, [("cID", "0"), ("rT", "1")])
            .with_timeout(Duration::from_secs(5));

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.form[0].0, "cID");
        assert_eq!(request.form_value("rT"), Some("1"));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn response_helpers() {
        let response = FetchResponse::new(200, r#"["a", 2]"#);
        assert!(response.is_success());
        assert_eq!(response.json().unwrap()[1], 2);
        assert!(!FetchResponse::new(404, "").is_success());
    }

    #[test]
    fn map_resolves_hostnames() {
        let hosts = HashMap::from([(String::from("al"), String::from("gate.example"))]);
        assert_eq!(hosts.hostname("al").as_deref(), Some("gate.example"));
        assert_eq!(hosts.hostname("dl"), None);
    }
}
