//! Shared application state.

use std::sync::Arc;

use axum::http::HeaderName;

use crate::auth::SessionSettings;
use crate::client::{ApiClient, BackendClient};
use crate::guard::RouteRules;
use crate::impl_has_session_backend;
use crate::jwt::SessionCodec;
use crate::rate_limit::RateLimitConfig;
use crate::ServerConfig;

/// Immutable state cloned into every handler. Holds configuration and
/// clients only; session data never lives here.
#[derive(Clone)]
pub struct AppState {
    pub codec: Arc<SessionCodec>,
    pub session: SessionSettings,
    pub client: Arc<ApiClient>,
    pub rules: Arc<RouteRules>,
    pub rate_limits: Arc<RateLimitConfig>,
}

impl_has_session_backend!(AppState);

impl AppState {
    /// Build state from server configuration.
    /// # Errors
    /// Returns an error if the backend HTTP client cannot be constructed.
    pub fn new(config: &ServerConfig) -> Result<Self, reqwest::Error> {
        let backend = BackendClient::new(config.backend_url.clone(), config.request_timeout)?;
        let client = ApiClient::new(backend, config.refresh_path.clone());

        Ok(Self {
            codec: Arc::new(SessionCodec::new(&config.session_secret)),
            session: SessionSettings {
                ttl: config.session_ttl,
                secure_cookies: config.secure_cookies,
            },
            client: Arc::new(client),
            rules: Arc::new(config.routes.clone()),
            rate_limits: Arc::new(RateLimitConfig::new(config.ip_header.clone())),
        })
    }

    pub fn ip_header(&self) -> Option<&HeaderName> {
        self.rate_limits.ip_header.as_ref()
    }
}
