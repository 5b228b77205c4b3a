//! The application-wide error type returned by `core_logic` operations and
//! turned into an HTTP response at the `api` boundary.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("device mismatch: {message}")]
    DeviceMismatch {
        message: String,
        locked_to_student: String,
        bound_at: Option<DateTime<Utc>>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("idempotency conflict: {0}")]
    IdempotencyConflict(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::DeviceMismatch { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::IdempotencyConflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::DeviceMismatch { .. } => "DEVICE_MISMATCH",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT",
            AppError::RateLimited(_) => "RATE_LIMITED",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    /// Extra fields beyond `{error, message, requestId}` that some error
    /// kinds carry (e.g. `DEVICE_MISMATCH`'s `lockedToStudent`/`boundAt`).
    fn extra(&self) -> Option<Value> {
        match self {
            AppError::DeviceMismatch {
                locked_to_student,
                bound_at,
                ..
            } => Some(json!({
                "lockedToStudent": locked_to_student,
                "boundAt": bound_at,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let request_id = Uuid::new_v4().to_string();

        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
            "requestId": request_id,
        });
        if let Some(extra) = self.extra() {
            if let (Value::Object(base), Value::Object(extra)) = (&mut body, extra) {
                base.extend(extra);
            }
        }

        (status, Json(body)).into_response()
    }
}

impl From<db::error::RepoError> for AppError {
    fn from(e: db::error::RepoError) -> Self {
        AppError::Internal(e.to_string())
    }
}
