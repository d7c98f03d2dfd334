use serde_json::Value;
use thiserror::Error;

/// Body text used when the server reply cannot be read at all.
pub(crate) const UNREADABLE_BODY: &str = "unreadable response from server";

/// Failure of a call to one of the external collaborators.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401/403: the surrounding app must invalidate the session.
    #[error("session expired (HTTP {status}), please log in again")]
    Unauthorized { status: u16 },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

fn body_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
}

/// Map a non-success status and its body onto the error taxonomy.
pub(crate) fn error_for_status(status: u16, reason: &str, body: &Value) -> ApiError {
    let message = body_field(body, "message");
    match status {
        401 | 403 => ApiError::Unauthorized { status },
        404 => ApiError::NotFound(message.unwrap_or("not found").to_string()),
        409 => ApiError::Conflict(message.unwrap_or("already exists").to_string()),
        400 => ApiError::BadRequest(
            message
                .or_else(|| body_field(body, "detail"))
                .unwrap_or("invalid data")
                .to_string(),
        ),
        _ => {
            let message = message
                .or_else(|| body_field(body, "error"))
                .or_else(|| body_field(body, "detail"))
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status} - {reason}"));
            ApiError::Status { status, message }
        }
    }
}
