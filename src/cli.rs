//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use axum::http::HeaderName;
use clap::Parser;
use tracing::{error, warn};
use url::Url;

use crate::ServerConfig;
use crate::guard::RouteRules;

const MIN_SESSION_SECRET_LENGTH: usize = 32;

/// Browsers cap cookie lifetimes at 400 days.
pub const MAX_SESSION_TTL_SECS: u64 = 400 * 24 * 60 * 60;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Carlot",
    about = "Session-holding front server for the car marketplace"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Base URL of the backend API (e.g., "https://api.example.com/v1")
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: String,

    /// Path to file containing the session secret. Prefer using SESSION_SECRET env var instead
    #[arg(long)]
    pub session_secret_file: Option<String>,

    /// Session lifetime in seconds
    #[arg(long, default_value = "86400",
        value_parser = clap::value_parser!(u64).range(1..=MAX_SESSION_TTL_SECS))]
    pub session_ttl_secs: u64,

    /// Backend path that exchanges a refresh token for a new token pair
    #[arg(long, default_value = "/auth/refresh", value_parser = validate_refresh_path)]
    pub refresh_path: String,

    /// Total timeout for one backend request, in seconds
    #[arg(long, default_value = "15", value_parser = clap::value_parser!(u64).range(1..))]
    pub request_timeout_secs: u64,

    /// Omit the Secure flag on the session cookie (local HTTP development only)
    #[arg(long)]
    pub insecure_cookies: bool,

    /// Header set by a trusted proxy carrying the client IP (e.g., "x-forwarded-for")
    #[arg(long, value_parser = parse_ip_header)]
    pub ip_header: Option<HeaderName>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_refresh_path(s: &str) -> Result<String, String> {
    if !s.starts_with('/') || s.starts_with("//") {
        return Err(format!("Refresh path must start with a single '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("Refresh path contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

fn parse_ip_header(s: &str) -> Result<HeaderName, String> {
    HeaderName::from_bytes(s.trim().to_ascii_lowercase().as_bytes())
        .map_err(|e| format!("Invalid header name '{}': {}", s, e))
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the session secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_session_secret(session_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("SESSION_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("SESSION_SECRET") };
        secret
    } else if let Some(path) = session_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read session secret file");
                return None;
            }
        }
    } else {
        error!(
            "Session secret is required. Set SESSION_SECRET environment variable (recommended) or use --session-secret-file"
        );
        return None;
    };

    check_secret_length(secret)
}

fn check_secret_length(secret: String) -> Option<String> {
    if secret.len() < MIN_SESSION_SECRET_LENGTH {
        error!(
            "Session secret is shorter than {} bytes. Use a longer secret",
            MIN_SESSION_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Parse and validate the backend URL.
/// Returns None and logs an error if validation fails.
pub fn validate_backend_url(backend_url: &str) -> Option<Url> {
    let url = match Url::parse(backend_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %backend_url, error = %e, "Invalid backend URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        error!(url = %backend_url, "Backend URL must be an http(s) URL with a host");
        return None;
    }

    if url.query().is_some() || url.fragment().is_some() {
        error!(url = %backend_url, "Backend URL must not carry a query or fragment");
        return None;
    }

    let is_https = url.scheme() == "https";
    let is_localhost = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    if !is_https && !is_localhost {
        warn!("Backend URL does not use HTTPS; tokens will travel in clear text");
    }

    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, backend_url: Url, session_secret: String) -> ServerConfig {
    if args.insecure_cookies {
        warn!("Session cookie will be sent without the Secure flag");
    }

    ServerConfig {
        backend_url,
        session_secret: session_secret.into_bytes(),
        session_ttl: Duration::from_secs(args.session_ttl_secs),
        refresh_path: args.refresh_path.clone(),
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        secure_cookies: !args.insecure_cookies,
        ip_header: args.ip_header.clone(),
        routes: RouteRules::default(),
    }
}
