//! Authenticated pass-through to the backend API.
//!
//! `/{*path}` forwards method, query and JSON body to the same path on the
//! backend with the session's credentials attached, and answers with the
//! result shape. Pages and forms use this instead of talking to the backend
//! directly, so tokens never leave the server.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Redirect, Response},
    routing::any,
};
use serde_json::Value;
use tracing::debug;

use crate::auth::SessionStore;
use crate::client::{ApiRequest, ApiResult};
use crate::state::AppState;

/// Request headers passed on to the backend.
const FORWARDED_HEADERS: [header::HeaderName; 2] =
    [header::ACCEPT_LANGUAGE, header::CONTENT_LANGUAGE];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/{*path}", any(forward))
        .with_state(state)
}

async fn forward(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    mut store: SessionStore,
    body: Bytes,
) -> Response {
    let body = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => Some(value),
            Err(_) => {
                let result: ApiResult<Value> = ApiResult::failure(
                    StatusCode::BAD_REQUEST,
                    Some("Request body must be JSON".to_string()),
                );
                return (StatusCode::BAD_REQUEST, store, Json(result)).into_response();
            }
        }
    };

    // Nesting strips `/api/backend`; the rest is sent still percent-encoded.
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let mut request = ApiRequest::new(method, target);
    request.body = body;
    for name in FORWARDED_HEADERS {
        if let Some(value) = headers.get(&name) {
            request.headers.insert(name, value.clone());
        }
    }

    match state.client.call::<Value>(&mut store, &request).await {
        Ok(result) => (result.http_status(), store, Json(result)).into_response(),
        Err(reason) => {
            debug!(reason = %reason, "Backend call needs sign-in");
            // 303 so that the follow-up is a GET whatever the original method was.
            (store, Redirect::to(&state.rules.sign_in_path)).into_response()
        }
    }
}
