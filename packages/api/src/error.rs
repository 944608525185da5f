//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use actors::SubmitError;
use db::DbError;
use storage::StorageError;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing or unknown API key.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown job or artifact.
    #[error("{0} not found")]
    NotFound(String),

    /// The submission could not be durably accepted.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// A database error from the job registry.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// An image store error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Validation(msg) => AppError::BadRequest(msg),
            SubmitError::QueueUnavailable(msg) => AppError::Unavailable(msg),
            SubmitError::Registry(e) => AppError::Unavailable(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{what} not found"),
            ),
            AppError::Unavailable(msg) => {
                tracing::warn!(error = %msg, "Submission refused");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "The job queue is unavailable, try again later".to_string(),
                )
            }
            AppError::Database(DbError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", "Job not found".to_string())
            }
            AppError::Storage(err) if err.is_not_found() => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Image not found".to_string(),
            ),
            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                internal()
            }
            AppError::Storage(err) => {
                tracing::error!(error = %err, "Storage error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_status_codes() {
        let cases = [
            (AppError::Unauthorized("missing".into()), StatusCode::UNAUTHORIZED),
            (AppError::BadRequest("empty".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("Job".into()), StatusCode::NOT_FOUND),
            (AppError::Unavailable("full".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                AppError::Database(DbError::NotFound("x".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Database(DbError::Query("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::Storage(StorageError::InvalidName("../x".into())),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn submit_errors_keep_their_meaning() {
        let err: AppError = SubmitError::Validation("prompt must not be empty".into()).into();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err: AppError = SubmitError::QueueUnavailable("full".into()).into();
        assert!(matches!(err, AppError::Unavailable(_)));
    }
}
