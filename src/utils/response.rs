use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Uniform error envelope returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub message: String,
    pub error_code: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

/// Application error type
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub errors: Option<Vec<String>>,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
            errors: None,
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn validation(errors: Vec<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_FAILED".to_string(),
            message: "request validation failed".to_string(),
            errors: Some(errors),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn store_unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "STORE_UNAVAILABLE",
            "order store is temporarily unavailable",
        )
    }

    pub fn queue_full() -> Self {
        Self::new(
            StatusCode::INSUFFICIENT_STORAGE,
            "QUEUE_FULL",
            "matching engine queue is full; retry later",
        )
    }

    pub fn internal(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            message: self.message,
            error_code: self.code,
            timestamp: chrono::Utc::now().timestamp_millis(),
            errors: self.errors,
        };
        (self.status, Json(body)).into_response()
    }
}
