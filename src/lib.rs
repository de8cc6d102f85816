pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod guard;
pub mod jwt;
pub mod pages;
pub mod rate_limit;
pub mod state;

use std::net::SocketAddr;
use std::time::Duration;

use api::create_api_router;
use axum::{Router, http::HeaderName};
use guard::RouteRules;
use state::AppState;
use tokio::net::TcpListener;
use url::Url;

pub struct ServerConfig {
    /// Base URL of the backend API (e.g., "https://api.example.com/v1")
    pub backend_url: Url,
    /// Secret for signing session envelopes
    pub session_secret: Vec<u8>,
    /// Session lifetime, used for both the envelope and the cookie
    pub session_ttl: Duration,
    /// Backend path that exchanges a refresh token for a new pair
    pub refresh_path: String,
    /// Total timeout for one backend request
    pub request_timeout: Duration,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Trusted proxy header carrying the client IP (requires running behind a proxy)
    pub ip_header: Option<HeaderName>,
    /// Page classification for the route guard
    pub routes: RouteRules,
}

impl ServerConfig {
    /// Configuration with defaults for everything but the backend and the secret.
    pub fn new(backend_url: Url, session_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            backend_url,
            session_secret: session_secret.into(),
            session_ttl: auth::DEFAULT_SESSION_TTL,
            refresh_path: client::DEFAULT_REFRESH_PATH.to_string(),
            request_timeout: client::DEFAULT_REQUEST_TIMEOUT,
            secure_cookies: true,
            ip_header: None,
            routes: RouteRules::default(),
        }
    }
}

/// Create the application router with the given configuration.
/// # Errors
/// Returns an error if the backend HTTP client cannot be constructed.
pub fn create_app(config: &ServerConfig) -> Result<Router, reqwest::Error> {
    let state = AppState::new(config)?;

    Ok(Router::new()
        .nest("/api", create_api_router(state.clone()))
        .merge(pages::router(state)))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task.
/// Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
