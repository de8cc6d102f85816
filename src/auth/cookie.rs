//! Session cookie parsing and `Set-Cookie` formatting.

use axum::http::header;
use chrono::{DateTime, Utc};

/// Name of the cookie carrying the signed session envelope.
pub const SESSION_COOKIE_NAME: &str = "session";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = value.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}

/// `Set-Cookie` value storing `envelope`, expiring at `expires_at` (Unix seconds).
pub fn session_cookie(envelope: &str, max_age: u64, expires_at: u64, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}; Expires={}{}",
        SESSION_COOKIE_NAME,
        envelope,
        max_age,
        http_date(expires_at),
        secure_attr(secure)
    )
}

/// `Set-Cookie` value deleting the session cookie.
pub fn clear_session_cookie(secure: bool) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0; Expires={}{}",
        SESSION_COOKIE_NAME,
        http_date(0),
        secure_attr(secure)
    )
}

fn secure_attr(secure: bool) -> &'static str {
    if secure { "; Secure" } else { "" }
}

/// IMF-fixdate, e.g. `Thu, 01 Jan 1970 00:00:00 GMT`.
/// Times past chrono's range are clamped to its maximum, never wrapped.
fn http_date(unix_secs: u64) -> String {
    let secs = i64::try_from(unix_secs).unwrap_or(i64::MAX);
    DateTime::from_timestamp(secs, 0)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
