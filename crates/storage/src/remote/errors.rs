use reqwest::StatusCode;
use serde::Deserialize;

use crate::repository::StorageError;

/// Error body shapes returned by the hosted backend.
///
/// Table endpoints answer `{code, message}`; auth endpoints answer
/// `{error_code, msg}` or the older `{error, error_description}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn text(&self) -> String {
        self.message
            .as_deref()
            .or(self.msg.as_deref())
            .or(self.error.as_deref())
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

const UNIQUE_VIOLATION: &str = "23505";
const INSUFFICIENT_PRIVILEGE: &str = "42501";
const SINGLE_ROW_MISSING: &str = "PGRST116";

/// Map a non-success response onto the storage taxonomy.
pub(crate) fn classify(status: StatusCode, body: &ErrorBody) -> StorageError {
    let code = body.code();
    let auth_code = body.error_code.as_deref().or(body.error.as_deref());
    let text = body.text();

    if code.as_deref() == Some(UNIQUE_VIOLATION)
        || matches!(auth_code, Some("user_already_exists" | "email_exists"))
        || text.contains("already registered")
    {
        return StorageError::Conflict;
    }
    if matches!(auth_code, Some("invalid_credentials" | "invalid_grant")) {
        return StorageError::InvalidCredentials;
    }
    if code.as_deref() == Some(SINGLE_ROW_MISSING) || status == StatusCode::NOT_FOUND {
        return StorageError::NotFound;
    }
    if code.as_deref() == Some(INSUFFICIENT_PRIVILEGE)
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::UNAUTHORIZED
    {
        return StorageError::PermissionDenied;
    }
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        return StorageError::Timeout;
    }
    StorageError::Connection(format!("backend returned {status}"))
}

pub(crate) fn from_transport(err: &reqwest::Error) -> StorageError {
    if err.is_timeout() {
        StorageError::Timeout
    } else if err.is_decode() {
        StorageError::Serialization(err.to_string())
    } else {
        StorageError::Connection(err.to_string())
    }
}
