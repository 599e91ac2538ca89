use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

/// TradeGate error types
///
/// `RateLimited` carries the human-readable operation subject ("creating
/// trading tickets", "matching trades", ...) so the 429 body can name the
/// offending operation.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("rate limit exceeded while {0}")]
    RateLimited(String),

    #[error("request body too large")]
    BodyTooLarge,

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("counter store error: {0}")]
    StoreError(String),

    #[error("proxy error: {0}")]
    ProxyError(String),

    #[error("internal server error: {0}")]
    InternalError(String),
}

impl From<GateError> for StatusCode {
    fn from(err: GateError) -> Self {
        From::from(&err)
    }
}

impl From<&GateError> for StatusCode {
    fn from(err: &GateError) -> Self {
        match err {
            GateError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GateError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GateError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GateError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GateError::ProxyError(_) => StatusCode::BAD_GATEWAY,
            GateError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> axum::response::Response {
        let status: StatusCode = From::from(&self);
        match self {
            GateError::RateLimited(operation) => (
                status,
                Json(serde_json::json!({
                    "success": false,
                    "error": format!(
                        "Too many requests while {}. Please try again later.",
                        operation
                    ),
                })),
            )
                .into_response(),
            other => (status, format!("{}", other)).into_response(),
        }
    }
}

impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        GateError::ProxyError(format!("HTTP request failed: {}", err))
    }
}
