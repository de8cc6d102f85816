//! Session endpoints.
//!
//! - POST `/sign-in` - Exchange credentials for a session cookie
//! - POST `/register` - Create an account and start a session
//! - POST `/sign-out` - End the session
//! - GET `/session` - Current user, if signed in

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::auth::SessionStore;
use crate::client::{ApiRequest, ApiResult};
use crate::jwt::{Session, SessionUser};
use crate::rate_limit::{rate_limit_register, rate_limit_sign_in};
use crate::state::AppState;

const BACKEND_LOGIN_PATH: &str = "/auth/login";
const BACKEND_REGISTER_PATH: &str = "/auth/register";
const BACKEND_LOGOUT_PATH: &str = "/auth/logout";

const NOT_AUTHENTICATED: &str = "Not authenticated";

pub fn router(state: AppState) -> Router {
    let sign_in_router = Router::new()
        .route("/sign-in", post(sign_in))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_sign_in,
        ));

    let register_router = Router::new()
        .route("/register", post(register))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_register,
        ));

    Router::new()
        .route("/session", get(current_session))
        .route("/sign-out", post(sign_out))
        .merge(sign_in_router)
        .merge(register_router)
        .with_state(state)
}

#[derive(Serialize, Deserialize)]
struct SignInRequest {
    email: String,
    password: String,
}

/// Successful login or registration as reported by the backend.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    user: SessionUser,
    access_token: String,
    refresh_token: String,
}

async fn sign_in(
    State(state): State<AppState>,
    store: SessionStore,
    Json(payload): Json<SignInRequest>,
) -> Response {
    let body = serde_json::json!({ "email": payload.email, "password": payload.password });
    establish_session(&state, store, ApiRequest::post(BACKEND_LOGIN_PATH, body)).await
}

/// Registration fields are owned by the registration form; they are forwarded as given.
async fn register(
    State(state): State<AppState>,
    store: SessionStore,
    Json(payload): Json<Value>,
) -> Response {
    establish_session(&state, store, ApiRequest::post(BACKEND_REGISTER_PATH, payload)).await
}

async fn establish_session(
    state: &AppState,
    mut store: SessionStore,
    request: ApiRequest,
) -> Response {
    let result: ApiResult<AuthResponse> = state.client.call_anonymous(&request).await;
    let status = result.http_status();

    let result = match result.data {
        Some(auth) if result.success => {
            let session = Session::new(auth.user, auth.access_token, auth.refresh_token);
            match store.create(&session) {
                Ok(()) => {
                    info!(session = %session.id, user = session.user.id, "Session started");
                    ApiResult::ok(session.user, status)
                }
                Err(e) => {
                    error!(error = %e, "Failed to start session");
                    ApiResult::failure(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Some("Failed to start session".to_string()),
                    )
                }
            }
        }
        data => ApiResult {
            data,
            ..result
        }
        .map(|auth| auth.user),
    };

    (result.http_status(), store, Json(result)).into_response()
}

async fn sign_out(State(state): State<AppState>, mut store: SessionStore) -> Response {
    if let Some(session) = store.read() {
        // Tell the backend so it can drop the refresh token; the cookie goes either way.
        if let Err(e) = state
            .client
            .backend()
            .send(
                Method::POST,
                BACKEND_LOGOUT_PATH,
                Some(&session.access_token),
                None,
                &HeaderMap::new(),
            )
            .await
        {
            warn!(session = %session.id, error = %e, "Backend logout failed");
        }
        state.client.end_session(&session.refresh_token).await;
        info!(session = %session.id, "Session ended");
    }
    store.destroy();

    let result: ApiResult<Value> = ApiResult::done(StatusCode::OK);
    (StatusCode::OK, store, Json(result)).into_response()
}

async fn current_session(mut store: SessionStore) -> Response {
    let result = match store.read() {
        Some(session) => ApiResult::ok(session.user, StatusCode::OK),
        None => ApiResult::failure(
            StatusCode::UNAUTHORIZED,
            Some(NOT_AUTHENTICATED.to_string()),
        ),
    };
    (result.http_status(), store, Json(result)).into_response()
}
