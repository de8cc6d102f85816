//! Rate limiting for credential endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking so sign-in and
//! registration cannot be used to hammer the backend with guesses.

use axum::{
    extract::{Request, State},
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::num::NonZeroU32;

use crate::auth::extract_client_ip;
use crate::state::AppState;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

const SIGN_IN_PER_MIN: NonZeroU32 = NonZeroU32::new(5).unwrap();
const REGISTER_PER_MIN: NonZeroU32 = NonZeroU32::new(3).unwrap();

/// Rate limiting configuration for credential endpoints.
pub struct RateLimitConfig {
    /// Per-IP limiter for sign-in (5 per minute)
    pub sign_in: IpLimiter,
    /// Per-IP limiter for registration (3 per minute)
    pub register: IpLimiter,
    /// Trusted proxy header carrying the client IP, if any
    pub ip_header: Option<HeaderName>,
}

impl RateLimitConfig {
    pub fn new(ip_header: Option<HeaderName>) -> Self {
        Self {
            sign_in: RateLimiter::keyed(Quota::per_minute(SIGN_IN_PER_MIN)),
            register: RateLimiter::keyed(Quota::per_minute(REGISTER_PER_MIN)),
            ip_header,
        }
    }
}

fn check(
    limiter: &IpLimiter,
    ip_header: Option<&HeaderName>,
    request: &Request,
) -> Result<(), Response> {
    let ip = extract_client_ip(request, ip_header).map_err(|e| {
        tracing::warn!(reason = e, "Unable to determine client IP");
        (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response()
    })?;

    limiter.check_key(&ip).map_err(|_| {
        tracing::info!(ip = %ip, "Rate limit exceeded");
        (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many attempts. Please wait before trying again.",
        )
            .into_response()
    })
}

/// Middleware for rate limiting sign-in.
pub async fn rate_limit_sign_in(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match check(&state.rate_limits.sign_in, state.ip_header(), &request) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match check(&state.rate_limits.register, state.ip_header(), &request) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}
