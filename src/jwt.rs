//! Signed session envelopes.
//!
//! A [`Session`] is serialized into an HS256 JWT together with `iat`/`exp`
//! claims. Expiry is checked by us rather than by `jsonwebtoken` so that the
//! caller can verify against an explicit clock and so an expired envelope is
//! reported separately from a forged one.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Identity record carried by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Authentication state for one signed-in client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session id, assigned at sign-in and kept across token rotation.
    /// Only used to correlate log lines.
    #[serde(rename = "sid")]
    pub id: String,
    pub user: SessionUser,
    pub access_token: String,
    pub refresh_token: String,
}

impl Session {
    /// Start a new session for a freshly authenticated user.
    pub fn new(user: SessionUser, access_token: String, refresh_token: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user,
            access_token,
            refresh_token,
        }
    }

    /// Same session and user with both tokens replaced.
    pub fn with_tokens(self, access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            ..self
        }
    }
}

/// Claims stored in the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    #[serde(flatten)]
    session: Session,
    /// Issued at (Unix timestamp)
    iat: u64,
    /// Expiration time (Unix timestamp)
    exp: u64,
}

/// Signs and verifies session envelopes with a symmetric secret.
#[derive(Clone)]
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Sign `session`, valid from `issued_at` (Unix seconds) for `ttl`.
    pub fn sign(
        &self,
        session: &Session,
        issued_at: u64,
        ttl: Duration,
    ) -> Result<String, CodecError> {
        let claims = SessionClaims {
            session: session.clone(),
            iat: issued_at,
            exp: issued_at.saturating_add(ttl.as_secs()),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(CodecError)
    }

    /// Verify an envelope against the current wall clock.
    pub fn verify(&self, envelope: &str) -> Result<Session, VerifyError> {
        self.verify_at(envelope, unix_now())
    }

    /// Verify an envelope as of `now` (Unix seconds).
    /// The envelope is expired once `now` reaches its `exp` claim.
    pub fn verify_at(&self, envelope: &str, now: u64) -> Result<Session, VerifyError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let token_data =
            jsonwebtoken::decode::<SessionClaims>(envelope, &self.decoding_key, &validation)
                .map_err(|e| match e.kind() {
                    ErrorKind::InvalidSignature => VerifyError::InvalidSignature,
                    _ => VerifyError::Malformed(e),
                })?;

        if now >= token_data.claims.exp {
            return Err(VerifyError::Expired);
        }

        Ok(token_data.claims.session)
    }
}

/// Current time as Unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// The session could not be serialized into an envelope.
#[derive(Debug)]
pub struct CodecError(jsonwebtoken::errors::Error);

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to sign session: {}", self.0)
    }
}

impl std::error::Error for CodecError {}

/// Why an envelope was not accepted. Callers treat every variant as
/// "no session"; the distinction is kept for logging.
#[derive(Debug)]
pub enum VerifyError {
    /// Signature does not match the payload
    InvalidSignature,
    /// Signature is fine but the envelope is past its `exp` claim
    Expired,
    /// Not a decodable envelope at all
    Malformed(jsonwebtoken::errors::Error),
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::InvalidSignature => write!(f, "Invalid signature"),
            VerifyError::Expired => write!(f, "Session expired"),
            VerifyError::Malformed(e) => write!(f, "Malformed session: {}", e),
        }
    }
}

impl std::error::Error for VerifyError {}
