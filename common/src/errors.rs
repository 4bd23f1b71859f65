//! Application error types.
//!
//! Every fallible operation in the registry returns [`AppResult`]. Errors
//! render as the standard [`ApiResponse`] envelope with a stable error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Library not found: {0}")]
    LibraryNotFound(String),

    #[error("Place not found: {0}")]
    PlaceNotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    #[error("Database query failed: {0}")]
    DatabaseQuery(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid place data: {0}")]
    PlaceData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidLocation(_) => "INVALID_LOCATION",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::LibraryNotFound(_) => "LIBRARY_NOT_FOUND",
            AppError::PlaceNotFound(_) => "PLACE_NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::DatabaseConnection(_) => "DATABASE_UNAVAILABLE",
            AppError::DatabaseQuery(_) => "DATABASE_ERROR",
            AppError::Migration(_) => "MIGRATION_ERROR",
            AppError::PlaceData(_) => "INVALID_PLACE_DATA",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidLocation(_) | AppError::PlaceData(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::LibraryNotFound(_) | AppError::PlaceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DatabaseConnection(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseQuery(_)
            | AppError::Migration(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => AppError::DatabaseConnection(err.to_string()),
            other => AppError::DatabaseQuery(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}
