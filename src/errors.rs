// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider authentication failed: {0}")]
    UpstreamAuth(String),

    #[error("Provider response unusable: {0}")]
    UpstreamResponse(String),

    #[error("Provider status lookup failed: {0}")]
    UpstreamStatus(String),

    #[error("Provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Donation not found")]
    DonationNotFound,

    #[error("Duplicate transaction id: {0}")]
    DuplicateTransaction(String),

    #[error("Attribution notification failed: {0}")]
    Notification(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Invalid input".to_string()),
            AppError::UpstreamAuth(_) => (StatusCode::BAD_GATEWAY, "Payment provider error".to_string()),
            AppError::UpstreamResponse(_) => (StatusCode::BAD_GATEWAY, "Payment provider error".to_string()),
            AppError::UpstreamStatus(_) => (StatusCode::BAD_GATEWAY, "Payment provider error".to_string()),
            AppError::UpstreamUnavailable(_) => (StatusCode::BAD_GATEWAY, "Payment provider unavailable".to_string()),
            AppError::DonationNotFound => (StatusCode::NOT_FOUND, "Donation not found".to_string()),
            AppError::DuplicateTransaction(_) => (StatusCode::CONFLICT, "Duplicate entry".to_string()),
            // Never returned by a handler; the engine swallows and logs these.
            AppError::Notification(_) => (StatusCode::BAD_GATEWAY, "Notification error".to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamUnavailable(format!("HTTP request failed: {}", err))
    }
}

impl AppError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    pub fn upstream_response(msg: impl Into<String>) -> Self {
        AppError::UpstreamResponse(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
