//! HTTP boundary between the session manager and the backend.
//!
//! Everything above this module speaks in terms of [`HttpRequest`] and
//! [`HttpResponse`]; only [`ReqwestTransport`] knows about sockets. A
//! transport never fails on an HTTP status, only on the inability to get one.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::ApiError;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// A fully resolved outbound call.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            body: None,
            query: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("failed to decode body: {}", e)))
    }

    /// Pull a human readable message out of a DRF-style error body
    /// (`{"detail": ...}` or `{"error": ...}`).
    pub fn detail(&self) -> Option<String> {
        let value: Value = serde_json::from_str(&self.body).ok()?;
        value
            .get("detail")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Per-call options for [`crate::auth::SessionManager::authorized_request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn patch(body: Value) -> Self {
        Self {
            method: Method::PATCH,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            ..Self::default()
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn into_request(self, url: String, bearer: Option<String>) -> HttpRequest {
        HttpRequest {
            method: self.method,
            url,
            bearer,
            body: self.body,
            query: self.query,
            timeout: self.timeout,
        }
    }
}

/// Join an API base and a path with exactly one slash between them.
///
/// Trailing slashes on the base are dropped and runs of slashes inside the
/// path collapse to one, so `join_url("http://h/api/", "//projects//1/")`
/// gives `http://h/api/projects/1/`.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let mut url = String::with_capacity(base.len() + path.len() + 1);
    url.push_str(base);
    url.push('/');

    let mut prev_slash = true;
    for c in path.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        url.push(c);
    }
    url
}

/// Transport backed by a pooled `reqwest::Client`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .header(header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!(method = %request.method, url = %request.url, status, "Request completed");
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h/api", "/token/"), "http://h/api/token/");
        assert_eq!(join_url("http://h/api/", "token/"), "http://h/api/token/");
        assert_eq!(
            join_url("http://h/api//", "//projects//1/"),
            "http://h/api/projects/1/"
        );
        assert_eq!(join_url("/api", ""), "/api/");
    }

    #[test]
    fn test_response_detail() {
        let resp = HttpResponse {
            status: 400,
            body: json!({"detail": "A user with that username already exists."}).to_string(),
        };
        assert_eq!(
            resp.detail().as_deref(),
            Some("A user with that username already exists.")
        );

        let resp = HttpResponse {
            status: 500,
            body: "<html>oops</html>".to_string(),
        };
        assert_eq!(resp.detail(), None);
    }

    #[test]
    fn test_response_json_error_is_invalid_response() {
        let resp = HttpResponse {
            status: 200,
            body: "not json".to_string(),
        };
        let err = resp.json::<Value>().unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_request_options_builders() {
        let opts = RequestOptions::get()
            .query("project", "7")
            .timeout(Duration::from_secs(3));
        assert_eq!(opts.method, Method::GET);
        assert_eq!(opts.query, vec![("project".to_string(), "7".to_string())]);

        let req = RequestOptions::patch(json!({"name": "Socks"}))
            .into_request("http://h/api/projects/1/".to_string(), Some("A1".to_string()));
        assert_eq!(req.method, Method::PATCH);
        assert_eq!(req.bearer.as_deref(), Some("A1"));
        assert_eq!(req.body, Some(json!({"name": "Socks"})));
        assert_eq!(req.timeout, None);
    }
}
