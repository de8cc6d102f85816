//! Per-request session store.
//!
//! The store is the only code that reads or writes the session cookie. It is
//! built fresh from the request's `Cookie` header (as an extractor), mutated
//! through `&mut self`, and handed back to axum as response parts so any
//! pending `Set-Cookie` header reaches the client.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, header::SET_COOKIE, request::Parts},
    response::{IntoResponseParts, ResponseParts},
};
use tracing::{debug, error};

use super::cookie::{SESSION_COOKIE_NAME, clear_session_cookie, get_cookie, session_cookie};
use super::state::HasSessionBackend;
use crate::jwt::{CodecError, Session, SessionCodec, unix_now};

/// Default session lifetime: one day.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cookie lifetime and transport settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Lifetime of the envelope and of the cookie carrying it
    pub ttl: Duration,
    /// Whether to set the `Secure` attribute (disable only for local HTTP)
    pub secure_cookies: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_SESSION_TTL,
            secure_cookies: true,
        }
    }
}

pub struct SessionStore {
    codec: Arc<SessionCodec>,
    settings: SessionSettings,
    /// Envelope as currently seen by this request.
    envelope: Option<String>,
    /// `Set-Cookie` value to send back, last write wins.
    pending: Option<String>,
}

impl SessionStore {
    pub fn new(
        codec: Arc<SessionCodec>,
        settings: SessionSettings,
        envelope: Option<String>,
    ) -> Self {
        Self {
            codec,
            settings,
            envelope,
            pending: None,
        }
    }

    pub fn from_headers(
        headers: &HeaderMap,
        codec: Arc<SessionCodec>,
        settings: SessionSettings,
    ) -> Self {
        let envelope = get_cookie(headers, SESSION_COOKIE_NAME)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Self::new(codec, settings, envelope)
    }

    /// Sign `session` and write it, replacing any existing cookie.
    pub fn create(&mut self, session: &Session) -> Result<(), StoreError> {
        let now = unix_now();
        let envelope = self
            .codec
            .sign(session, now, self.settings.ttl)
            .map_err(StoreError::Codec)?;

        let ttl = self.settings.ttl.as_secs();
        self.pending = Some(session_cookie(
            &envelope,
            ttl,
            now.saturating_add(ttl),
            self.settings.secure_cookies,
        ));
        self.envelope = Some(envelope);
        Ok(())
    }

    /// Current session, if the cookie holds a valid envelope.
    /// An envelope that fails verification is deleted.
    pub fn read(&mut self) -> Option<Session> {
        let envelope = self.envelope.as_deref()?;
        match self.codec.verify(envelope) {
            Ok(session) => Some(session),
            Err(e) => {
                debug!(reason = %e, "Discarding session cookie");
                self.destroy();
                None
            }
        }
    }

    /// Replace both tokens of the current session, keeping its user.
    pub fn rotate(
        &mut self,
        access_token: String,
        refresh_token: String,
    ) -> Result<Session, StoreError> {
        let current = self.read().ok_or(StoreError::NoActiveSession)?;
        let rotated = current.with_tokens(access_token, refresh_token);
        self.create(&rotated)?;
        debug!(session = %rotated.id, "Session tokens rotated");
        Ok(rotated)
    }

    /// Delete the session cookie. Safe to call any number of times.
    pub fn destroy(&mut self) {
        self.envelope = None;
        self.pending = Some(clear_session_cookie(self.settings.secure_cookies));
    }

    /// The `Set-Cookie` value this request will send, if any.
    pub fn pending_cookie(&self) -> Option<&str> {
        self.pending.as_deref()
    }
}

impl<S> FromRequestParts<S> for SessionStore
where
    S: HasSessionBackend + Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(SessionStore::from_headers(
            &parts.headers,
            state.codec().clone(),
            state.session_settings().clone(),
        ))
    }
}

impl IntoResponseParts for SessionStore {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        if let Some(cookie) = self.pending {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    res.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => error!(error = %e, "Session cookie is not a valid header value"),
            }
        }
        Ok(res)
    }
}

/// Errors from session store writes.
#[derive(Debug)]
pub enum StoreError {
    /// Rotation was requested but there is no valid session to rotate
    NoActiveSession,
    /// The session could not be signed
    Codec(CodecError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NoActiveSession => write!(f, "No active session"),
            StoreError::Codec(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StoreError {}
