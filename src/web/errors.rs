//! # Web Error Types
//!
//! HTTP mappings for failures surfaced while handling a request. View and
//! data-access errors convert into [`ApiError`] so handlers can use `?`.

use crate::persistence::DataAccessError;
use crate::views::ViewError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found")]
    NotFound,

    #[error("View not found: {name}")]
    ViewNotFound { name: String },

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Service temporarily unavailable")]
    ServiceUnavailable,

    #[error("Request timeout")]
    Timeout,

    #[error("Database operation failed: {operation}")]
    DatabaseError { operation: String },

    #[error("Failed to render view: {view}")]
    RenderError { view: String },

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn database_error(operation: impl Into<String>) -> Self {
        Self::DatabaseError {
            operation: operation.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound | ApiError::ViewNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::DatabaseError { .. } | ApiError::RenderError { .. } | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound => "NOT_FOUND",
            ApiError::ViewNotFound { .. } => "VIEW_NOT_FOUND",
            ApiError::BadRequest { .. } => "BAD_REQUEST",
            ApiError::Conflict { .. } => "CONFLICT",
            ApiError::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ApiError::Timeout => "TIMEOUT",
            ApiError::DatabaseError { .. } => "DATABASE_ERROR",
            ApiError::RenderError { .. } => "RENDER_ERROR",
            ApiError::Internal => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string()
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

impl From<ViewError> for ApiError {
    fn from(err: ViewError) -> Self {
        match err {
            ViewError::NotFound { name, location } => {
                warn!(view = %name, location = %location, "View not found");
                ApiError::ViewNotFound { name }
            }
            ViewError::InvalidName { name, reason } => {
                ApiError::bad_request(format!("invalid view name '{name}': {reason}"))
            }
            ViewError::Model { name, error } | ViewError::Render { name, error } => {
                error!(view = %name, error = %error, "View rendering failed");
                ApiError::RenderError { view: name }
            }
            other => {
                error!(error = %other, "View pipeline error");
                ApiError::Internal
            }
        }
    }
}

impl From<DataAccessError> for ApiError {
    fn from(err: DataAccessError) -> Self {
        match err {
            DataAccessError::NotFound => ApiError::NotFound,
            DataAccessError::DuplicateKey { .. } | DataAccessError::ForeignKeyViolation { .. } => {
                ApiError::Conflict {
                    message: err.to_string(),
                }
            }
            DataAccessError::Timeout => ApiError::Timeout,
            DataAccessError::ConnectionFailure(_) => ApiError::ServiceUnavailable,
            other => {
                error!(error = %other, "Data access failed");
                ApiError::database_error("Database operation failed")
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        DataAccessError::from(err).into()
    }
}

/// Result type for web handlers
pub type ApiResult<T> = Result<T, ApiError>;
