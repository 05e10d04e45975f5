//! Outbound JSON calls to third-party APIs.
//!
//! [`send_with_retry`] is the resilient variant used for LLM calls: an attempt
//! only succeeds when the transport completes with a 2xx status and a JSON
//! body; everything else is retried according to the [`RetryPolicy`].

use std::collections::BTreeMap;

use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::Settings;
use crate::retry::{retry, RetryPolicy};

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("HTTP error! status: {status}, message: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("upstream call failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<UpstreamError>,
    },
}

impl UpstreamError {
    /// Transport failure without the request URL, whose query may carry an
    /// API key.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        UpstreamError::Transport(err.without_url().to_string())
    }
}

/// Immutable description of one outbound request. Each attempt builds a fresh
/// `reqwest` request from it.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: BTreeMap<String, String>,
    body: Option<Value>,
}

impl UpstreamRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// URL without query parameters; safe to log since API keys travel in the
    /// query or headers.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    fn to_builder(&self, client: &Client) -> RequestBuilder {
        let mut builder = client.request(self.method.clone(), self.url.as_str());
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &self.body {
            builder = builder.json(body);
        }
        builder
    }
}

/// HTTP client shared by all outbound calls, with the per-call timeout from
/// `UPSTREAM_TIMEOUT_SECS`.
pub fn http_client(settings: &Settings) -> reqwest::Result<Client> {
    Client::builder().timeout(settings.upstream_timeout()).build()
}

/// Performs a single attempt and returns the parsed JSON body of a 2xx
/// response.
pub async fn send_once(client: &Client, request: &UpstreamRequest) -> Result<Value, UpstreamError> {
    debug!(method = %request.method, url = %request.url, "\u{2192} upstream request");
    let res = request
        .to_builder(client)
        .send()
        .await
        .map_err(UpstreamError::transport)?;

    let status = res.status();
    let bytes = res
        .bytes()
        .await
        .map_err(UpstreamError::transport)?;
    debug!(
        %status,
        "\u{2190} body = {}",
        String::from_utf8_lossy(&bytes[..bytes.len().min(512)])
    );

    if !status.is_success() {
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            message: error_message(&bytes),
        });
    }

    serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))
}

/// Performs the request under `policy`, surfacing one aggregated error that
/// carries the last attempt's failure once the budget is spent.
pub async fn send_with_retry(
    client: &Client,
    request: &UpstreamRequest,
    policy: &RetryPolicy,
) -> Result<Value, UpstreamError> {
    retry(policy, |_| send_once(client, request))
        .await
        .map_err(|exhausted| {
            error!(
                url = %request.url,
                attempts = exhausted.attempts,
                "upstream call gave up: {}",
                exhausted.last
            );
            UpstreamError::Exhausted {
                attempts: exhausted.attempts,
                last: Box::new(exhausted.last),
            }
        })
}

/// Extracts `error.message` from an upstream error body.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_message_prefers_upstream_text() {
        let body = json!({"error": {"message": "Rate limit reached"}}).to_string();
        assert_eq!(error_message(body.as_bytes()), "Rate limit reached");
        assert_eq!(error_message(b"<html>bad gateway</html>"), "Unknown error");
    }

    #[test]
    fn exhausted_error_reports_last_status() {
        let err = UpstreamError::Exhausted {
            attempts: 5,
            last: Box::new(UpstreamError::Status {
                status: 429,
                message: "slow down".into(),
            }),
        };
        assert!(err.to_string().contains("after 5 attempts"));
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn request_description_is_kept_verbatim() {
        let req = UpstreamRequest::post_json("http://localhost/v1/x", json!({"a": 1}))
            .with_header("Authorization", "Bearer k")
            .with_query("key", "secret");
        assert_eq!(req.method(), &Method::POST);
        assert_eq!(req.url(), "http://localhost/v1/x");
        assert_eq!(req.headers().get("Authorization").map(String::as_str), Some("Bearer k"));
        assert_eq!(req.body(), Some(&json!({"a": 1})));
    }
}
