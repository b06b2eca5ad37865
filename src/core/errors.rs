use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Upper bound on provider-supplied text carried into an error message.
const MAX_PROVIDER_MESSAGE_CHARS: usize = 300;

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    /// Builds a normalized provider failure. Only the provider's own error
    /// message survives, clipped, so raw payloads never reach callers.
    pub fn provider(provider: &str, status: Option<u16>, detail: impl AsRef<str>) -> Self {
        let detail: String = detail
            .as_ref()
            .trim()
            .chars()
            .take(MAX_PROVIDER_MESSAGE_CHARS)
            .collect();
        let message = match (status, detail.is_empty()) {
            (Some(code), true) => format!("{} request failed ({})", provider, code),
            (Some(code), false) => format!("{} request failed ({}): {}", provider, code, detail),
            (None, true) => format!("{} request failed", provider),
            (None, false) => format!("{} request failed: {}", provider, detail),
        };
        ApiError::Provider(message)
    }

    pub fn transport(provider: &str, err: reqwest::Error) -> Self {
        let detail = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "could not connect".to_string()
        } else if err.is_decode() {
            "malformed response".to_string()
        } else {
            "transport failure".to_string()
        };
        ApiError::provider(provider, err.status().map(|s| s.as_u16()), detail)
    }

    /// Message shown to end users (stream error events, JSON error bodies).
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Configuration(msg)
            | ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Provider(msg)
            | ApiError::Internal(msg) => msg.clone(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        let body = Json(json!({ "error": self.public_message() }));
        (status, body).into_response()
    }
}
