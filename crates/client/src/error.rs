//! Error taxonomy for calls against the order/payment backend.
//!
//! Every backend call returns [`ApiError`]. Non-2xx responses are classified
//! by status code so callers can react without inspecting raw bodies:
//!
//! | Status | Variant |
//! |---|---|
//! | 400 | `Validation` (per-field messages) |
//! | 401, 403 | `Auth` |
//! | 404 | `NotFound` |
//! | 409 | `Conflict` |
//! | other | `Server` |

use std::collections::BTreeMap;
use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

use crate::auth::AuthError;

/// The backend could not be reached or the exchange did not complete.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, DNS, TLS, or body-read failure.
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The request could not be built (bad URL, unserializable body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors from backend calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network unreachable or request never completed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid credentials, rejected token, or ended session.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The backend rejected the request body.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The request conflicts with the resource state (e.g. order already confirmed).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success response.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// A success response did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Classify a non-success response.
    #[must_use]
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let json: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let message = message_from(json.as_ref(), status, body);

        match status {
            StatusCode::BAD_REQUEST => Self::Validation(
                json.as_ref()
                    .map(ValidationErrors::from_json)
                    .filter(|errors| !errors.is_empty())
                    .unwrap_or_else(|| ValidationErrors::non_field(message)),
            ),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Self::Auth(AuthError::Unauthorized(message))
            }
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::CONFLICT => Self::Conflict(message),
            _ => Self::Server {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Whether the failure means the user must sign in again.
    #[must_use]
    pub const fn requires_reauthentication(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Human-readable message for an error response body.
pub(crate) fn response_message(status: StatusCode, body: &str) -> String {
    let json: Option<serde_json::Value> = serde_json::from_str(body).ok();
    message_from(json.as_ref(), status, body)
}

fn message_from(json: Option<&serde_json::Value>, status: StatusCode, body: &str) -> String {
    json.and_then(extract_message)
        .unwrap_or_else(|| fallback_message(status, body))
}

/// Pick the human-readable message the backend put in an error body.
fn extract_message(json: &serde_json::Value) -> Option<String> {
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| json.get(key).and_then(serde_json::Value::as_str))
        .map(str::to_string)
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() || body.starts_with('{') || body.starts_with('<') {
        status
            .canonical_reason()
            .unwrap_or("Something went wrong")
            .to_string()
    } else {
        body.chars().take(200).collect()
    }
}

/// Per-field validation messages, keyed by request field name.
///
/// Errors not tied to a field are stored under [`ValidationErrors::NON_FIELD`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Key used for errors that do not belong to a specific field.
    pub const NON_FIELD: &'static str = "non_field_errors";

    /// A single message not attached to a field.
    #[must_use]
    pub fn non_field(message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(Self::NON_FIELD.to_string(), vec![message.into()]);
        Self { fields }
    }

    /// Parse a `{field: [messages]}` body. Non-object bodies yield no errors.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        let Some(object) = json.as_object() else {
            return Self::default();
        };

        let fields = object
            .iter()
            .map(|(field, value)| {
                let field = if field == "detail" {
                    Self::NON_FIELD.to_string()
                } else {
                    field.clone()
                };
                (field, flatten_messages(value))
            })
            .filter(|(_, messages)| !messages.is_empty())
            .collect();
        Self { fields }
    }

    /// Messages for one field.
    #[must_use]
    pub fn field(&self, name: &str) -> &[String] {
        self.fields.get(name).map_or(&[], Vec::as_slice)
    }

    /// Iterate `(field, messages)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn flatten_messages(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(values) => values.iter().flat_map(flatten_messages).collect(),
        serde_json::Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .fields
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&rendered)
    }
}
