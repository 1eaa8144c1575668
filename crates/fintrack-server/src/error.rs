use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

pub const UNAUTHENTICATED_MESSAGE: &str = "Not authorized to access this route";
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0:?}")]
    Validation(Vec<String>),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthenticated")]
    Unauthenticated,

    /// Login failure. Unknown email and wrong password share one message.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(vec![message.into()])
    }
}

/// Request bodies that parse as JSON but do not fit the payload shape are
/// validation errors; everything else about an unreadable body is a bad request.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => AppError::Validation(vec![e.body_text()]),
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let internal = || {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        };

        let (status, message) = match &self {
            AppError::Validation(errors) => {
                let body = json!({ "message": "Validation error", "errors": errors });
                return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, UNAUTHENTICATED_MESSAGE.to_string())
            }
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                INVALID_CREDENTIALS_MESSAGE.to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            // Duplicate unique fields are reported as a plain client error.
            AppError::Conflict(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                internal()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {e}");
                internal()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                internal()
            }
        };

        let body = json!({ "message": message });
        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Map a unique-constraint violation to `Conflict`, passing other errors through.
pub fn conflict_on_constraint(e: rusqlite::Error, message: &str) -> AppError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict(message.to_string())
        }
        e => AppError::Database(e),
    }
}
