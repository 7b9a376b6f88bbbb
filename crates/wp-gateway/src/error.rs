//! Maps kernel errors (and request-local ones) onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self { status: StatusCode::CONFLICT, message: message.into() }
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self { status: StatusCode::PRECONDITION_FAILED, message: message.into() }
    }
}

impl From<wp_domain::Error> for ApiError {
    fn from(err: wp_domain::Error) -> Self {
        let status = match &err {
            wp_domain::Error::NotFound(_) => StatusCode::NOT_FOUND,
            wp_domain::Error::Config(_) | wp_domain::Error::Validation(_) => StatusCode::BAD_REQUEST,
            wp_domain::Error::Boundary(_) => StatusCode::CONFLICT,
            wp_domain::Error::Concurrency(_) => StatusCode::PRECONDITION_FAILED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: err.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}
