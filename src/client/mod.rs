//! Authenticated calls to the backend API.
//!
//! [`ApiClient::call`] performs one logical call on behalf of the session in a
//! [`SessionStore`]:
//!
//! 1. read the session (none means the caller must sign in),
//! 2. send the request with the access token as bearer credential,
//! 3. on 401, refresh once and resend once with the new access token.
//!
//! A call therefore reaches the backend's resource at most twice and the
//! refresh endpoint at most once, whatever the backend answers.

mod backend;
mod refresh;
mod result;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::SessionStore;

pub use backend::{
    BackendClient, BackendError, BackendResponse, DEFAULT_REQUEST_TIMEOUT, EndpointError,
};
pub use refresh::{
    DEFAULT_REFRESH_GRACE, DEFAULT_REFRESH_PATH, RefreshCoordinator, RefreshFailure,
    RefreshFlights, RefreshOutcome, TokenPair,
};
pub use result::{
    ApiResult, GENERAL_ERRORS_KEY, NETWORK_FAILURE_MESSAGE, SERVER_ERROR_MESSAGE,
    UNAUTHORIZED_MESSAGE, UNEXPECTED_RESPONSE_MESSAGE,
};

/// One request to the backend, relative to its base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// The call could not be made for this user without signing in again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequired {
    /// There was no valid session to begin with
    NoSession,
    /// The refresh token was rejected and the session has been destroyed
    RefreshRejected,
}

impl std::fmt::Display for AuthRequired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthRequired::NoSession => write!(f, "Not authenticated"),
            AuthRequired::RefreshRejected => write!(f, "Reauthentication required"),
        }
    }
}

impl std::error::Error for AuthRequired {}

pub struct ApiClient {
    backend: BackendClient,
    refresh: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(backend: BackendClient, refresh_path: impl Into<String>) -> Self {
        Self::with_flights(backend, refresh_path, RefreshFlights::default())
    }

    pub fn with_flights(
        backend: BackendClient,
        refresh_path: impl Into<String>,
        flights: RefreshFlights,
    ) -> Self {
        let refresh = RefreshCoordinator::new(backend.clone(), refresh_path, flights);
        Self { backend, refresh }
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    /// Stop sharing refresh results for a session that has ended, so its old
    /// refresh tokens can no longer be turned into the rotated pair.
    pub async fn end_session(&self, refresh_token: &str) {
        if !refresh_token.is_empty() {
            self.refresh.forget(refresh_token).await;
        }
    }

    /// Perform an authenticated call for the session held in `store`.
    ///
    /// Backend failures, including a second 401, come back as an unsuccessful
    /// [`ApiResult`]. Only a missing session or a rejected refresh token is an
    /// error, since the only remedy for those is signing in.
    pub async fn call<T: DeserializeOwned>(
        &self,
        store: &mut SessionStore,
        request: &ApiRequest,
    ) -> Result<ApiResult<T>, AuthRequired> {
        if let Err(e) = self.backend.endpoint(&request.path) {
            warn!(path = %request.path, error = %e, "Refusing backend request");
            return Ok(ApiResult::failure(
                StatusCode::BAD_REQUEST,
                Some(e.to_string()),
            ));
        }

        let session = store.read().ok_or(AuthRequired::NoSession)?;

        let response = match self.attempt(request, &session.access_token).await {
            Ok(response) => response,
            Err(e) => {
                warn!(session = %session.id, error = %e, "Backend unreachable");
                return Ok(ApiResult::network_failure());
            }
        };

        if response.status != StatusCode::UNAUTHORIZED || session.refresh_token.is_empty() {
            return Ok(ApiResult::from_response(response));
        }

        debug!(session = %session.id, path = %request.path, "Access token rejected, refreshing");
        let access_token = match self.refresh.refresh(store).await {
            RefreshOutcome::Refreshed(token) => token,
            RefreshOutcome::ReauthenticationRequired => return Err(AuthRequired::RefreshRejected),
            RefreshOutcome::Unavailable => return Ok(ApiResult::network_failure()),
        };

        match self.attempt(request, &access_token).await {
            Ok(response) => Ok(ApiResult::from_response(response)),
            Err(e) => {
                warn!(session = %session.id, error = %e, "Backend unreachable on retry");
                Ok(ApiResult::network_failure())
            }
        }
    }

    /// Perform a call without credentials (sign-in, registration).
    pub async fn call_anonymous<T: DeserializeOwned>(&self, request: &ApiRequest) -> ApiResult<T> {
        match self
            .backend
            .send(
                request.method.clone(),
                &request.path,
                None,
                request.body.as_ref(),
                &request.headers,
            )
            .await
        {
            Ok(response) => ApiResult::from_response(response),
            Err(BackendError::Endpoint(e)) => {
                warn!(path = %request.path, error = %e, "Refusing backend request");
                ApiResult::failure(StatusCode::BAD_REQUEST, Some(e.to_string()))
            }
            Err(e) => {
                warn!(error = %e, "Backend unreachable");
                ApiResult::network_failure()
            }
        }
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        access_token: &str,
    ) -> Result<BackendResponse, BackendError> {
        self.backend
            .send(
                request.method.clone(),
                &request.path,
                Some(access_token),
                request.body.as_ref(),
                &request.headers,
            )
            .await
    }
}
