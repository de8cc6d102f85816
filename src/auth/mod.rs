//! Cookie-carried session handling.
//!
//! The whole session (user, access token, refresh token) lives in a single
//! signed `session` cookie. Nothing is cached in-process: every request reads
//! the cookie through its own [`SessionStore`] and writes it back through the
//! same store.

mod cookie;
mod ip;
mod state;
mod store;

pub use cookie::{SESSION_COOKIE_NAME, clear_session_cookie, get_cookie, session_cookie};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::HasSessionBackend;
pub use store::{DEFAULT_SESSION_TTL, SessionSettings, SessionStore, StoreError};
