//! Refresh token exchange.
//!
//! A refresh swaps the session's refresh token for a new access/refresh pair
//! at the backend and rotates the session cookie. It runs at most once per
//! call chain and never triggers another refresh itself.
//!
//! Exchanges go through [`RefreshFlights`], so concurrent requests holding the
//! same refresh token share one backend call instead of racing each other
//! into a double rotation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, OnceCell};
use tracing::{error, info, warn};

use super::backend::BackendClient;
use crate::auth::SessionStore;

/// Default backend path of the refresh endpoint.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// How long a finished exchange stays available to late requests that still
/// carry the old refresh token.
pub const DEFAULT_REFRESH_GRACE: Duration = Duration::from_secs(30);

/// Token pair returned by the backend refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Why an exchange produced no token pair.
#[derive(Debug, Clone)]
pub enum RefreshFailure {
    /// The backend refused the refresh token
    Rejected(StatusCode),
    /// No usable answer (transport error, 5xx, unreadable body)
    Unavailable(String),
}

/// What the wrapper should do after a refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Session rotated; retry with this access token
    Refreshed(String),
    /// Session destroyed; the user has to sign in again
    ReauthenticationRequired,
    /// Refresh could not be completed; session left as it was
    Unavailable,
}

type FlightResult = Result<TokenPair, RefreshFailure>;

struct Flight {
    result: Arc<OnceCell<FlightResult>>,
    started: Instant,
}

/// Single-flight registry of refresh exchanges keyed by refresh token.
pub struct RefreshFlights {
    flights: Mutex<HashMap<String, Flight>>,
    grace: Duration,
}

impl RefreshFlights {
    pub fn new(grace: Duration) -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
            grace,
        }
    }

    /// Run `exchange` for `refresh_token` unless an exchange for the same token
    /// is already running or finished within the grace window, in which case
    /// its result is shared.
    pub async fn run<F, Fut>(&self, refresh_token: &str, exchange: F) -> FlightResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlightResult>,
    {
        let cell = {
            let mut flights = self.flights.lock().await;
            let now = Instant::now();
            flights.retain(|_, flight| {
                flight.result.get().is_none() || now.duration_since(flight.started) < self.grace
            });
            flights
                .entry(refresh_token.to_string())
                .or_insert_with(|| Flight {
                    result: Arc::new(OnceCell::new()),
                    started: now,
                })
                .result
                .clone()
        };

        let result = cell.get_or_init(exchange).await.clone();

        // Transport problems are not an answer about the token; let the next caller retry.
        if matches!(result, Err(RefreshFailure::Unavailable(_))) {
            let mut flights = self.flights.lock().await;
            let same_flight = flights
                .get(refresh_token)
                .is_some_and(|flight| Arc::ptr_eq(&flight.result, &cell));
            if same_flight {
                flights.remove(refresh_token);
            }
        }

        result
    }

    /// Drop every exchange that involves `refresh_token`, either as the token
    /// exchanged or as the token it was rotated into. A cookie replayed after
    /// sign-out then reaches the backend instead of the grace window.
    pub async fn forget(&self, refresh_token: &str) {
        let mut flights = self.flights.lock().await;
        flights.retain(|exchanged, flight| {
            let rotated_into = matches!(
                flight.result.get(),
                Some(Ok(pair)) if pair.refresh_token == refresh_token
            );
            exchanged != refresh_token && !rotated_into
        });
    }

    /// Number of tracked exchanges, including finished ones still in grace.
    pub async fn tracked(&self) -> usize {
        self.flights.lock().await.len()
    }
}

impl Default for RefreshFlights {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_GRACE)
    }
}

pub struct RefreshCoordinator {
    backend: BackendClient,
    path: String,
    flights: RefreshFlights,
}

impl RefreshCoordinator {
    pub fn new(backend: BackendClient, path: impl Into<String>, flights: RefreshFlights) -> Self {
        Self {
            backend,
            path: path.into(),
            flights,
        }
    }

    /// Forget shared exchanges for a session that is ending.
    pub async fn forget(&self, refresh_token: &str) {
        self.flights.forget(refresh_token).await;
    }

    /// Exchange the session's refresh token and rotate the session.
    pub async fn refresh(&self, store: &mut SessionStore) -> RefreshOutcome {
        let Some(session) = store.read() else {
            return RefreshOutcome::ReauthenticationRequired;
        };
        if session.refresh_token.is_empty() {
            store.destroy();
            return RefreshOutcome::ReauthenticationRequired;
        }

        let result = self
            .flights
            .run(&session.refresh_token, || {
                self.exchange(&session.refresh_token)
            })
            .await;

        match result {
            Ok(pair) => match store.rotate(pair.access_token, pair.refresh_token) {
                Ok(rotated) => RefreshOutcome::Refreshed(rotated.access_token),
                Err(e) => {
                    error!(session = %session.id, error = %e, "Failed to store refreshed session");
                    store.destroy();
                    RefreshOutcome::ReauthenticationRequired
                }
            },
            Err(RefreshFailure::Rejected(status)) => {
                info!(session = %session.id, status = status.as_u16(), "Refresh token rejected");
                store.destroy();
                RefreshOutcome::ReauthenticationRequired
            }
            Err(RefreshFailure::Unavailable(reason)) => {
                warn!(session = %session.id, reason = %reason, "Token refresh unavailable");
                RefreshOutcome::Unavailable
            }
        }
    }

    async fn exchange(&self, refresh_token: &str) -> FlightResult {
        let body = json!({ "refreshToken": refresh_token });
        let response = self
            .backend
            .send(Method::POST, &self.path, None, Some(&body), &HeaderMap::new())
            .await
            .map_err(|e| RefreshFailure::Unavailable(e.to_string()))?;

        if response.status.is_success() {
            serde_json::from_value(response.body).map_err(|e| {
                RefreshFailure::Unavailable(format!("Invalid refresh response: {}", e))
            })
        } else if response.status.is_server_error() {
            Err(RefreshFailure::Unavailable(format!(
                "Refresh endpoint returned {}",
                response.status
            )))
        } else {
            Err(RefreshFailure::Rejected(response.status))
        }
    }
}
