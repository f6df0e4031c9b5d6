//! Uniform error shape for backend failures.
//!
//! The backend answers failures in several shapes (validation envelopes,
//! bare messages, plain strings, nothing at all). Everything is folded
//! into [`ApiError`] here so callers only ever see one structure.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fallback text when nothing better is available.
pub const DEFAULT_ERROR_MESSAGE: &str = "Request failed";

/// Per-field validation messages, in the order the backend sent them.
pub type FieldErrors = IndexMap<String, Vec<String>>;

/// Normalized backend error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// HTTP status, absent for transport failures.
    pub status: Option<u16>,
    /// Display message, annotated with the first field error when present.
    pub message: String,
    /// Full field error map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl ApiError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: None,
        }
    }

    /// Normalizes an HTTP error response.
    pub fn from_response(status: u16, body: &str) -> Self {
        let fallback = format!("Request failed with status code {status}");
        normalize(Some(status), body, Some(&fallback))
    }

    /// Wraps a transport-level failure (connect, timeout, body decode).
    pub fn transport(err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "Request timed out".to_string()
        } else if err.is_connect() {
            "Could not connect to server".to_string()
        } else if err.is_decode() {
            "Failed to decode response".to_string()
        } else {
            err.to_string()
        };
        Self::new(err.status().map(|s| s.as_u16()), message)
    }

    /// Error for a body that arrived but did not have the expected shape.
    pub fn malformed(what: &str) -> Self {
        Self::new(None, format!("Unexpected response from {what}"))
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }

    /// Messages for a single field, if the backend reported any.
    pub fn field(&self, name: &str) -> Option<&[String]> {
        self.errors
            .as_ref()
            .and_then(|errors| errors.get(name))
            .map(Vec::as_slice)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Folds a raw error body into an [`ApiError`].
///
/// Message precedence: JSON `message`, then a plain string body, then
/// `fallback`, then [`DEFAULT_ERROR_MESSAGE`]. When `errors` is an object the
/// first field's first message is appended as `"<message>: <first>"`.
pub fn normalize(status: Option<u16>, body: &str, fallback: Option<&str>) -> ApiError {
    let data = serde_json::from_str::<Value>(body).ok();

    let base_message = data
        .as_ref()
        .and_then(|d| d.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| plain_message(data.as_ref(), body))
        .or_else(|| fallback.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());

    let errors = data
        .as_ref()
        .and_then(|d| d.get("errors"))
        .and_then(Value::as_object)
        .map(|object| {
            object
                .iter()
                .map(|(field, messages)| (field.clone(), field_messages(messages)))
                .collect::<FieldErrors>()
        });

    let Some(errors) = errors else {
        return ApiError::new(status, base_message);
    };

    let first = errors
        .values()
        .next()
        .and_then(|messages| messages.first())
        .cloned();
    let message = match first {
        Some(first) => format!("{base_message}: {first}"),
        None => base_message,
    };

    ApiError {
        status,
        message,
        errors: Some(errors),
    }
}

/// A body that is itself a message: a JSON string, or non-JSON text that
/// does not look like an HTML error page.
fn plain_message(data: Option<&Value>, body: &str) -> Option<String> {
    match data {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(_) => None,
        None => {
            let trimmed = body.trim();
            (!trimmed.is_empty() && !trimmed.starts_with('<')).then(|| trimmed.to_string())
        }
    }
}

fn field_messages(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Display text for a failed operation: the normalized message when the
/// failure came from the backend, else the error's own text, else `fallback`.
pub fn error_message(err: &anyhow::Error, fallback: &str) -> String {
    if let Some(api) = err.downcast_ref::<ApiError>()
        && !api.message.trim().is_empty()
    {
        return api.message.clone();
    }
    let text = err.to_string();
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_appends_first_field_message() {
        let body = r#"{"message":"Validation failed","errors":{"email":["already taken"]}}"#;
        let err = ApiError::from_response(422, body);

        assert_eq!(err.status, Some(422));
        assert_eq!(err.message, "Validation failed: already taken");
        assert_eq!(err.field("email").unwrap(), ["already taken".to_string()]);
    }

    #[test]
    fn test_first_field_follows_backend_order() {
        let body = r#"{"message":"Invalid","errors":{"password":["too short"],"email":["bad"]}}"#;
        let err = normalize(Some(422), body, None);
        assert_eq!(err.message, "Invalid: too short");
        let keys: Vec<&String> = err.errors.as_ref().unwrap().keys().collect();
        assert_eq!(keys, ["password", "email"]);
    }

    #[test]
    fn test_message_without_errors() {
        let err = ApiError::from_response(403, r#"{"message":"Forbidden"}"#);
        assert_eq!(err.message, "Forbidden");
        assert!(err.errors.is_none());
    }

    #[test]
    fn test_empty_field_list_keeps_base_message() {
        let err = normalize(Some(422), r#"{"message":"Nope","errors":{"name":[]}}"#, None);
        assert_eq!(err.message, "Nope");
        assert_eq!(err.field("name").unwrap().len(), 0);
    }

    #[test]
    fn test_string_bodies() {
        assert_eq!(
            ApiError::from_response(500, r#""Server exploded""#).message,
            "Server exploded"
        );
        assert_eq!(
            ApiError::from_response(502, "Bad gateway").message,
            "Bad gateway"
        );
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(
            ApiError::from_response(500, "").message,
            "Request failed with status code 500"
        );
        assert_eq!(
            ApiError::from_response(500, "<html>oops</html>").message,
            "Request failed with status code 500"
        );
        assert_eq!(normalize(None, "{}", None).message, DEFAULT_ERROR_MESSAGE);
    }

    #[test]
    fn test_unauthorized_flag() {
        assert!(ApiError::from_response(401, "").is_unauthorized());
        assert!(!ApiError::from_response(422, "").is_unauthorized());
    }

    #[test]
    fn test_error_message_prefers_api_error() {
        let err = anyhow::Error::new(ApiError::new(Some(500), "Boom"));
        assert_eq!(error_message(&err, "fallback"), "Boom");

        let err = anyhow::anyhow!("socket closed");
        assert_eq!(error_message(&err, "fallback"), "socket closed");

        let err = anyhow::Error::new(ApiError::new(None, ""));
        assert_eq!(error_message(&err, "fallback"), "fallback");
    }
}
