#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderName, Request, Response, header},
};
use carlot::auth::{SESSION_COOKIE_NAME, SessionSettings, SessionStore};
use carlot::jwt::{Session, SessionCodec, SessionUser, unix_now};
use carlot::{ServerConfig, create_app};
use url::Url;
use wiremock::MockServer;

pub const TEST_SECRET: &[u8] = b"test-session-secret-with-32-bytes!!";

/// Header the test apps trust for the client IP.
pub const IP_HEADER: &str = "x-forwarded-for";

/// Backend base URL for a mock server, mounted under `/api` so that base-path
/// joining is exercised.
pub fn backend_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/api", server.uri())).expect("Invalid mock server URL")
}

pub fn test_config(backend_url: Url) -> ServerConfig {
    let mut config = ServerConfig::new(backend_url, TEST_SECRET);
    config.secure_cookies = false;
    config.request_timeout = Duration::from_secs(2);
    config.ip_header = Some(HeaderName::from_static(IP_HEADER));
    config
}

pub fn create_test_app(server: &MockServer) -> axum::Router {
    create_app(&test_config(backend_url(server))).expect("Failed to create app")
}

pub fn codec() -> Arc<SessionCodec> {
    Arc::new(SessionCodec::new(TEST_SECRET))
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        ttl: Duration::from_secs(3600),
        secure_cookies: false,
    }
}

pub fn test_user() -> SessionUser {
    SessionUser {
        id: 7,
        name: "Ada Lovelace".to_string(),
        roles: vec!["customer".to_string()],
        permissions: vec!["bookings.create".to_string()],
    }
}

pub fn test_session(access_token: &str, refresh_token: &str) -> Session {
    Session::new(test_user(), access_token.to_string(), refresh_token.to_string())
}

/// Store holding a freshly created session, as if the request carried its cookie.
pub fn store_with_session(access_token: &str, refresh_token: &str) -> SessionStore {
    let codec = codec();
    let envelope = codec
        .sign(
            &test_session(access_token, refresh_token),
            unix_now(),
            Duration::from_secs(3600),
        )
        .unwrap();
    SessionStore::new(codec, settings(), Some(envelope))
}

pub fn empty_store() -> SessionStore {
    SessionStore::new(codec(), settings(), None)
}

/// `Cookie` header value carrying a valid envelope for `session`.
pub fn cookie_for(session: &Session) -> String {
    let envelope = codec()
        .sign(session, unix_now(), Duration::from_secs(3600))
        .unwrap();
    format!("{}={}", SESSION_COOKIE_NAME, envelope)
}

/// `Cookie` header value carrying an envelope that expired an hour ago.
pub fn expired_cookie_for(session: &Session) -> String {
    let envelope = codec()
        .sign(session, unix_now() - 7200, Duration::from_secs(3600))
        .unwrap();
    format!("{}={}", SESSION_COOKIE_NAME, envelope)
}

/// The session `Set-Cookie` header of a response, if any.
pub fn session_set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", SESSION_COOKIE_NAME)))
        .map(str::to_string)
}

/// Turn a `Set-Cookie` value into the `Cookie` header a browser would send back.
pub fn cookie_from_set_cookie(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(IP_HEADER, "203.0.113.7")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .header(IP_HEADER, "203.0.113.7");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}
