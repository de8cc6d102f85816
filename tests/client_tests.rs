//! Tests for authenticated backend calls.
//!
//! Tests cover:
//! - Bearer credential on the first attempt
//! - Refresh and single retry after a 401
//! - At most two resource calls and one refresh per logical call
//! - Rejected refresh destroying the session
//! - Error classification (validation, server, network)
//! - Concurrent calls from one session sharing a single refresh

mod common;

use std::time::Duration;

use carlot::client::{
    ApiClient, ApiRequest, ApiResult, AuthRequired, BackendClient, GENERAL_ERRORS_KEY,
    NETWORK_FAILURE_MESSAGE,
};
use common::{backend_url, empty_store, store_with_session};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REFRESH_PATH: &str = "/api/auth/refresh";

fn client_for(server: &MockServer) -> ApiClient {
    let backend = BackendClient::new(backend_url(server), Duration::from_secs(2)).unwrap();
    ApiClient::new(backend, "/auth/refresh")
}

async fn mount_refresh(server: &MockServer, from: &str, to: (&str, &str), expected: u64) {
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .and(body_json(json!({ "refreshToken": from })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": to.0,
            "refreshToken": to.1,
        })))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_call_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/listings"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut store = store_with_session("access-1", "refresh-1");

    let result: ApiResult<Value> = client
        .call(&mut store, &ApiRequest::get("/listings"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.status, Some(200));
    assert_eq!(result.data, Some(json!([{"id": 1}])));
    assert!(store.pending_cookie().is_none(), "No cookie write without refresh");
}

#[tokio::test]
async fn test_query_and_body_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/bookings"))
        .and(query_param("notify", "true"))
        .and(body_json(json!({"listingId": 3, "days": 2})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 99})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut store = store_with_session("access-1", "refresh-1");
    let request = ApiRequest::post("/bookings?notify=true", json!({"listingId": 3, "days": 2}));

    let result: ApiResult<Value> = client.call(&mut store, &request).await.unwrap();

    assert!(result.success);
    assert_eq!(result.status, Some(201));
}

#[tokio::test]
async fn test_expired_access_token_is_refreshed_and_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Token expired"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Ada"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, "refresh-1", ("access-2", "refresh-2"), 1).await;

    let client = client_for(&server);
    let mut store = store_with_session("access-1", "refresh-1");
    let original = store.read().unwrap();

    let result: ApiResult<Value> = client
        .call(&mut store, &ApiRequest::get("/profile"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.data, Some(json!({"name": "Ada"})));

    let rotated = store.read().unwrap();
    assert_eq!(rotated.access_token, "access-2");
    assert_eq!(rotated.refresh_token, "refresh-2");
    assert_eq!(rotated.user, original.user);
    assert_eq!(rotated.id, original.id);

    let cookie = store.pending_cookie().expect("Rotated session must be written");
    assert!(cookie.starts_with("session="));
    assert!(!cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_second_401_is_returned_without_looping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh(&server, "refresh-1", ("access-2", "refresh-2"), 1).await;

    let client = client_for(&server);
    let mut store = store_with_session("access-1", "refresh-1");

    let result: ApiResult<Value> = client
        .call(&mut store, &ApiRequest::get("/profile"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status, Some(401));
    assert_eq!(result.message.as_deref(), Some("Unauthorized"));
    // The refresh itself succeeded, so the rotated session is kept.
    assert_eq!(store.read().unwrap().access_token, "access-2");
}

#[tokio::test]
async fn test_rejected_refresh_destroys_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"message": "Refresh token revoked"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut store = store_with_session("access-1", "refresh-1");

    let result = client
        .call::<Value>(&mut store, &ApiRequest::get("/profile"))
        .await;

    assert_eq!(result.unwrap_err(), AuthRequired::RefreshRejected);
    assert!(store.read().is_none());
    let cookie = store.pending_cookie().expect("Session cookie must be cleared");
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_refresh_outage_keeps_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut store = store_with_session("access-1", "refresh-1");

    let result: ApiResult<Value> = client
        .call(&mut store, &ApiRequest::get("/profile"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status, Some(500));
    assert_eq!(result.message.as_deref(), Some(NETWORK_FAILURE_MESSAGE));

    let session = store.read().expect("Session survives a refresh outage");
    assert_eq!(session.access_token, "access-1");
    assert_eq!(session.refresh_token, "refresh-1");
    assert!(store.pending_cookie().is_none());
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/listings"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "Database down"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut store = store_with_session("access-1", "refresh-1");

    let result: ApiResult<Value> = client
        .call(&mut store, &ApiRequest::get("/listings"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status, Some(500));
    assert_eq!(result.message.as_deref(), Some("Database down"));
}

#[tokio::test]
async fn test_validation_errors_pass_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/listings"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "The given data was invalid.",
            "errors": {"price": ["The price must be at least 1."]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut store = store_with_session("access-1", "refresh-1");

    let result: ApiResult<Value> = client
        .call(&mut store, &ApiRequest::post("/listings", json!({"price": 0})))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status, Some(422));
    assert_eq!(result.message.as_deref(), Some("The given data was invalid."));
    assert_eq!(
        result.errors.unwrap()["price"],
        vec!["The price must be at least 1.".to_string()]
    );
}

#[tokio::test]
async fn test_irregular_error_bodies_keep_backend_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "Email already taken",
            "errors": ["email"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/bookings"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "statusCode": 400,
            "message": ["days must be positive", "listingId must be a number"],
            "error": "Bad Request"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut store = store_with_session("access-1", "refresh-1");

    let result: ApiResult<Value> = client
        .call(&mut store, &ApiRequest::post("/users", json!({"email": "ada@example.com"})))
        .await
        .unwrap();
    assert_eq!(result.message.as_deref(), Some("Email already taken"));
    assert_eq!(
        result.errors.unwrap()[GENERAL_ERRORS_KEY],
        vec!["email".to_string()]
    );

    let result: ApiResult<Value> = client
        .call(&mut store, &ApiRequest::post("/bookings", json!({"days": -1})))
        .await
        .unwrap();
    assert_eq!(
        result.message.as_deref(),
        Some("days must be positive; listingId must be a number")
    );
    assert_eq!(result.status, Some(400));
}

#[tokio::test]
async fn test_unreachable_backend_is_network_failure() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let url = url::Url::parse(&format!("http://127.0.0.1:{}/api", port)).unwrap();
    let backend = BackendClient::new(url, Duration::from_secs(2)).unwrap();
    let client = ApiClient::new(backend, "/auth/refresh");
    let mut store = store_with_session("access-1", "refresh-1");

    let result: ApiResult<Value> = client
        .call(&mut store, &ApiRequest::get("/listings"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status, Some(500));
    assert_eq!(result.message.as_deref(), Some(NETWORK_FAILURE_MESSAGE));
    assert!(store.read().is_some());
}

#[tokio::test]
async fn test_no_session_sends_nothing() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let mut store = empty_store();

    let result = client
        .call::<Value>(&mut store, &ApiRequest::get("/listings"))
        .await;

    assert_eq!(result.unwrap_err(), AuthRequired::NoSession);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_foreign_paths_are_refused() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    let mut store = store_with_session("access-1", "refresh-1");

    for target in [
        "https://evil.example/steal",
        "//evil.example/steal",
        "/../admin",
        "/listings/%2e%2e/admin",
        "listings",
    ] {
        let result: ApiResult<Value> = client
            .call(&mut store, &ApiRequest::get(target))
            .await
            .unwrap();
        assert!(!result.success, "{} must be refused", target);
        assert_eq!(result.status, Some(400));
    }

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_session_without_refresh_token_skips_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut store = store_with_session("access-1", "");

    let result: ApiResult<Value> = client
        .call(&mut store, &ApiRequest::get("/profile"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status, Some(401));
}

#[tokio::test]
async fn test_concurrent_calls_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/bookings"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/bookings"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "access-2", "refreshToken": "refresh-2"}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    // Two requests from the same browser carry the same cookie.
    let mut first = store_with_session("access-1", "refresh-1");
    let mut second = store_with_session("access-1", "refresh-1");
    let request = ApiRequest::get("/bookings");

    let (a, b) = tokio::join!(
        client.call::<Value>(&mut first, &request),
        client.call::<Value>(&mut second, &request),
    );

    assert!(a.unwrap().success);
    assert!(b.unwrap().success);
    assert_eq!(first.read().unwrap().refresh_token, "refresh-2");
    assert_eq!(second.read().unwrap().refresh_token, "refresh-2");
}
