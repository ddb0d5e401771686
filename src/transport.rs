//! HTTP transport seam: wire-level request/response types and the
//! collaborator trait the executor dispatches through.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, SdkError};

/// Content framing of the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    /// No body.
    #[default]
    Empty,
    /// `application/x-www-form-urlencoded`.
    Form,
    /// `application/json`.
    Json,
}

impl BodyKind {
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            BodyKind::Empty => None,
            BodyKind::Form => Some("application/x-www-form-urlencoded"),
            BodyKind::Json => Some("application/json"),
        }
    }
}

/// A fully built, not-yet-signed HTTP request.
///
/// BTreeMap keys give deterministic header and query ordering, which the
/// signer relies on for reproducible canonicalization.
#[derive(Debug, Clone, Default)]
pub struct HttpRequestSpec {
    pub method: String,
    /// URI path with template placeholders already substituted.
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub body_kind: BodyKind,
}

impl HttpRequestSpec {
    /// Sets a header, lowercasing the name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Renders the query string (already percent-encoded keys/values).
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Full URL against `endpoint`, including the query string.
    pub fn url(&self, endpoint: &str) -> String {
        let base = endpoint.trim_end_matches('/');
        if self.query.is_empty() {
            format!("{}{}", base, self.path)
        } else {
            format!("{}{}?{}", base, self.path, self.query_string())
        }
    }
}

/// A raw HTTP response as seen by the executor.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Body as text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Content type header without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
    }
}

/// Opaque request/response primitive the core dispatches through.
///
/// Implementations must support per-request timeouts; connection reuse is
/// the implementation's business. Network-level failures map to
/// [`SdkError::Transport`], which the executor treats as transient.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, endpoint: &str, request: &HttpRequestSpec) -> Result<HttpResponse>;
}

/// Default transport backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, endpoint: &str, request: &HttpRequestSpec) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| SdkError::Config(format!("invalid HTTP method {}", request.method)))?;

        let mut builder = self.http.request(method, request.url(endpoint));
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(content_type) = request.body_kind.content_type() {
            builder = builder.header("content-type", content_type);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(classify_reqwest_error)?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> SdkError {
    if e.is_timeout() {
        SdkError::Transport(format!("request timed out: {}", e))
    } else if e.is_connect() {
        SdkError::Transport(format!("connection failed: {}", e))
    } else {
        SdkError::Transport(e.to_string())
    }
}
