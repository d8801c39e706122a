// Error types for velvet-gateway
// Author: kelexine (https://github.com/kelexine)

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error("Cooling down. Try again in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Image generation failed: {0}")]
    Upstream(String),

    #[error("Agent routing failed: {0}")]
    Routing(String),

    /// No response from the gateway at all. Only the studio client raises this.
    #[error("Gateway unreachable: {0}")]
    Unreachable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Only upstream failures are worth another attempt; everything else is
    /// either the caller's fault or cannot change between attempts.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Upstream(_))
    }

    /// Seconds the caller should wait before trying again, if known.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            GatewayError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable category, used for metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "validation",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::Upstream(_) => "upstream",
            GatewayError::Routing(_) => "routing",
            GatewayError::Unreachable(_) => "unreachable",
            GatewayError::Config(_) | GatewayError::ConfigParsing(_) => "configuration",
            GatewayError::Storage(_) | GatewayError::Io(_) => "storage",
            _ => "internal",
        }
    }
}

// Convert GatewayError to the `{ success: false, error }` envelope
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        match self.retry_after() {
            Some(retry_after) => {
                let body = json!({
                    "success": false,
                    "error": message,
                    "retryAfter": retry_after,
                });
                let mut response = (status, axum::Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                response
            }
            None => {
                let body = json!({
                    "success": false,
                    "error": message,
                });
                (status, axum::Json(body)).into_response()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
