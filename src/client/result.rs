//! The result shape handed to every caller of the backend.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::backend::BackendResponse;

/// Message used when no response was received at all.
pub const NETWORK_FAILURE_MESSAGE: &str = "Something went wrong. Please try again later.";

/// Fallback for a 401 that carries no message of its own.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";

/// Fallback for a 5xx that carries no message of its own.
pub const SERVER_ERROR_MESSAGE: &str = "Server error";

/// Message used when a 2xx body does not match the expected type.
pub const UNEXPECTED_RESPONSE_MESSAGE: &str = "Unexpected response from server";

/// Outcome of one logical backend call.
///
/// Callers branch on `success` and render `message`/`errors` as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl<T> ApiResult<T> {
    pub fn ok(data: T, status: StatusCode) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            status: Some(status.as_u16()),
        }
    }

    /// Success without a payload.
    pub fn done(status: StatusCode) -> Self {
        Self {
            success: true,
            data: None,
            message: None,
            errors: None,
            status: Some(status.as_u16()),
        }
    }

    pub fn failure(status: StatusCode, message: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            message,
            errors: None,
            status: Some(status.as_u16()),
        }
    }

    /// No response from the backend (connect error, timeout, broken body).
    pub fn network_failure() -> Self {
        Self::failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some(NETWORK_FAILURE_MESSAGE.to_string()),
        )
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResult<U> {
        ApiResult {
            success: self.success,
            data: self.data.map(f),
            message: self.message,
            errors: self.errors,
            status: self.status,
        }
    }

    /// HTTP status to answer with when this result is returned to a browser.
    pub fn http_status(&self) -> StatusCode {
        self.status
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(if self.success {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            })
    }
}

impl<T: DeserializeOwned> ApiResult<T> {
    /// Classify a backend response.
    ///
    /// Backend `message` and `errors` are passed through untouched; a fallback
    /// message is only supplied for 401 and 5xx responses that carry none.
    pub fn from_response(response: BackendResponse) -> Self {
        let status = response.status;

        if status.is_success() {
            return match serde_json::from_value::<T>(response.body) {
                Ok(data) => Self::ok(data, status),
                Err(e) => {
                    tracing::warn!(
                        status = status.as_u16(),
                        error = %e,
                        "Unexpected response body"
                    );
                    Self::failure(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Some(UNEXPECTED_RESPONSE_MESSAGE.to_string()),
                    )
                }
            };
        }

        let payload = ErrorPayload::from_body(response.body);
        let message = payload.message.or_else(|| {
            if status == StatusCode::UNAUTHORIZED {
                Some(UNAUTHORIZED_MESSAGE.to_string())
            } else if status.is_server_error() {
                Some(SERVER_ERROR_MESSAGE.to_string())
            } else {
                None
            }
        });

        Self {
            success: false,
            data: None,
            message,
            errors: payload.errors,
            status: Some(status.as_u16()),
        }
    }
}

/// Key for errors that are not attached to a field (a bare string or list).
pub const GENERAL_ERRORS_KEY: &str = "base";

/// Error body as reported by the backend.
///
/// `message` and `errors` are read independently so that an unusual shape in
/// one never hides the other.
#[derive(Debug, Default)]
struct ErrorPayload {
    message: Option<String>,
    errors: Option<BTreeMap<String, Vec<String>>>,
}

impl ErrorPayload {
    fn from_body(body: Value) -> Self {
        let Value::Object(mut fields) = body else {
            return Self::default();
        };
        Self {
            message: fields.remove("message").and_then(message_text),
            errors: fields.remove("errors").and_then(field_errors),
        }
    }
}

/// A message may be a string or a list of strings (joined with "; ").
fn message_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Array(items) => {
            let parts: Vec<String> = items.into_iter().filter_map(message_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        Value::Object(fields) => match fields.get("message") {
            Some(Value::String(text)) => Some(text.clone()),
            _ => Some(Value::Object(fields).to_string()),
        },
        other => Some(other.to_string()),
    }
}

fn field_errors(value: Value) -> Option<BTreeMap<String, Vec<String>>> {
    let errors: BTreeMap<String, Vec<String>> = match value {
        Value::Object(fields) => fields
            .into_iter()
            .map(|(field, messages)| (field, messages_list(messages)))
            .filter(|(_, messages)| !messages.is_empty())
            .collect(),
        Value::Null => BTreeMap::new(),
        other => {
            let messages = messages_list(other);
            if messages.is_empty() {
                BTreeMap::new()
            } else {
                BTreeMap::from([(GENERAL_ERRORS_KEY.to_string(), messages)])
            }
        }
    };
    if errors.is_empty() { None } else { Some(errors) }
}

/// One message, a list of them, or objects carrying a `message`.
fn messages_list(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.into_iter().filter_map(message_text).collect(),
        other => message_text(other).into_iter().collect(),
    }
}
