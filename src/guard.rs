//! Route guard for page navigation.
//!
//! Every page path is either protected (needs a session), auth-only (sign-in
//! and friends, pointless with a session) or public. The guard only reads the
//! session cookie. It never refreshes tokens, so a still-valid envelope passes
//! however close to expiry it is, and an invalid one counts as signed out.

use axum::{
    Extension,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use crate::auth::SessionStore;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Protected,
    AuthOnly,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision<'a> {
    Pass,
    Redirect(&'a str),
}

/// Path classification and redirect targets.
#[derive(Debug, Clone)]
pub struct RouteRules {
    /// Prefixes that require a session
    pub protected: Vec<String>,
    /// Prefixes only meant for signed-out visitors
    pub auth_only: Vec<String>,
    /// Where signed-out visitors of protected pages are sent
    pub sign_in_path: String,
    /// Where signed-in visitors of auth-only pages are sent
    pub landing_path: String,
}

impl Default for RouteRules {
    fn default() -> Self {
        Self {
            protected: [
                "/dashboard",
                "/profile",
                "/my-listings",
                "/bookings",
                "/listings/new",
            ]
            .map(String::from)
            .to_vec(),
            auth_only: ["/sign-in", "/register", "/forgot-password"]
                .map(String::from)
                .to_vec(),
            sign_in_path: "/sign-in".to_string(),
            landing_path: "/dashboard".to_string(),
        }
    }
}

impl RouteRules {
    pub fn classify(&self, path: &str) -> PathClass {
        if self.protected.iter().any(|prefix| matches_prefix(path, prefix)) {
            PathClass::Protected
        } else if self.auth_only.iter().any(|prefix| matches_prefix(path, prefix)) {
            PathClass::AuthOnly
        } else {
            PathClass::Public
        }
    }

    pub fn decide(&self, path: &str, authenticated: bool) -> GuardDecision<'_> {
        match (self.classify(path), authenticated) {
            (PathClass::Protected, false) => GuardDecision::Redirect(&self.sign_in_path),
            (PathClass::AuthOnly, true) => GuardDecision::Redirect(&self.landing_path),
            _ => GuardDecision::Pass,
        }
    }
}

/// `/listings/new` matches `/listings/new` and `/listings/new/...` but not `/listings/newest`.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Middleware applying [`RouteRules`] to page requests.
///
/// On pass-through with a valid session, the session is attached to the
/// request as an `Extension<Session>` for page handlers.
pub async fn route_guard(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut store = SessionStore::from_headers(
        request.headers(),
        state.codec.clone(),
        state.session.clone(),
    );
    let session = store.read();
    let path = request.uri().path().to_string();

    let response = match state.rules.decide(&path, session.is_some()) {
        GuardDecision::Redirect(target) => {
            debug!(path = %path, target = %target, "Route guard redirect");
            Redirect::temporary(target).into_response()
        }
        GuardDecision::Pass => {
            if let Some(session) = session {
                request.extensions_mut().insert(session);
            }
            next.run(request).await
        }
    };

    // Carries the deletion of a cookie that failed verification.
    (store, response).into_response()
}

/// Session attached by [`route_guard`], if any.
pub type GuardedSession = Option<Extension<crate::jwt::Session>>;
