//! HTTP transport to the backend API.
//!
//! Every request goes to a path under one configured base URL. Paths supplied
//! by callers are validated so that the final URL can never leave the
//! backend's origin or climb above its base path.

use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default total timeout for one backend request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Status and decoded body of a backend response.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    /// JSON body, or `Null` when the body is empty or not JSON
    pub body: Value,
}

#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BackendClient {
    /// Build a client for the API at `base_url`.
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a relative API path (with optional query) against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, EndpointError> {
        let path_only = path.split(['?', '#']).next().unwrap_or_default();

        if !path.starts_with('/') || path.starts_with("//") {
            return Err(EndpointError::NotRelative);
        }
        if path_only.contains('\\') || path_only.contains("://") {
            return Err(EndpointError::NotRelative);
        }
        if path_only
            .split('/')
            .any(|segment| segment == ".." || segment == "." || is_encoded_dot_segment(segment))
        {
            return Err(EndpointError::DotSegment);
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        let url = Url::parse(&format!("{}{}", base, path)).map_err(EndpointError::Parse)?;

        let base_path = self.base_url.path().trim_end_matches('/');
        if url.origin() != self.base_url.origin() || !url.path().starts_with(base_path) {
            return Err(EndpointError::ForeignTarget);
        }

        Ok(url)
    }

    /// Send one JSON request.
    /// # Errors
    /// Returns an error if the path is rejected or no response was received.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<&Value>,
        headers: &HeaderMap,
    ) -> Result<BackendResponse, BackendError> {
        let url = self.endpoint(path).map_err(BackendError::Endpoint)?;
        debug!(method = %method, path = %url.path(), "backend request");

        // Credentials only ever come from `bearer`.
        let mut extra = headers.clone();
        extra.remove(reqwest::header::AUTHORIZATION);
        extra.remove(reqwest::header::COOKIE);

        let mut request = self
            .http
            .request(method, url)
            .headers(extra)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(BackendError::Transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(BackendError::Transport)?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        debug!(status = status.as_u16(), "backend response");
        Ok(BackendResponse { status, body })
    }
}

fn is_encoded_dot_segment(segment: &str) -> bool {
    let lower = segment.to_ascii_lowercase();
    lower.contains("%2e") && lower.replace("%2e", ".").chars().all(|c| c == '.')
}

/// A caller-supplied path that cannot be sent.
#[derive(Debug)]
pub enum EndpointError {
    /// Absolute URL, scheme-relative URL or missing leading slash
    NotRelative,
    /// Path contains `.` or `..` segments
    DotSegment,
    /// Resolved URL leaves the backend base
    ForeignTarget,
    Parse(url::ParseError),
}

impl std::fmt::Display for EndpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointError::NotRelative => write!(f, "API path must be relative to the backend"),
            EndpointError::DotSegment => write!(f, "API path must not contain dot segments"),
            EndpointError::ForeignTarget => write!(f, "API path resolves outside the backend"),
            EndpointError::Parse(e) => write!(f, "Invalid API path: {}", e),
        }
    }
}

impl std::error::Error for EndpointError {}

#[derive(Debug)]
pub enum BackendError {
    Endpoint(EndpointError),
    /// No response: connect failure, timeout or unreadable body
    Transport(reqwest::Error),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Endpoint(e) => write!(f, "{}", e),
            BackendError::Transport(e) => write!(f, "Backend request failed: {}", e),
        }
    }
}

impl std::error::Error for BackendError {}
