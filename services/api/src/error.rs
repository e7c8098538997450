//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how each
//! variant is rendered at the HTTP boundary.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use book_catalog_core::{PortError, ReviewError, TokenError};
use serde_json::json;
use tracing::{debug, error};

use crate::config::ConfigError;
use crate::web::validation::FieldError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from the store port.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No session token was presented.
    #[error("Authentication required. Please login first.")]
    AuthenticationRequired,

    /// The presented token failed signature or expiry checks.
    #[error("Invalid or expired token: {0}")]
    InvalidOrExpiredToken(#[source] TokenError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The authenticated identity does not own the targeted resource.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("You have already reviewed this book")]
    DuplicateReview,

    /// Input shape or range violations, detected before any write.
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// The book's rating could not be recomputed after a review mutation.
    #[error("Failed to update book rating: {0}")]
    AggregationFailure(#[source] PortError),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::AuthenticationRequired
            | ApiError::InvalidOrExpiredToken(_)
            | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::DuplicateReview | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Port(PortError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Port(PortError::Conflict(_)) => StatusCode::BAD_REQUEST,
            ApiError::Port(PortError::Unexpected(_))
            | ApiError::Config(_)
            | ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::AggregationFailure(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(reason) => ApiError::Internal(reason),
            other => ApiError::InvalidOrExpiredToken(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation("body", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::validation("path", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation("query", rejection.body_text())
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::BookNotFound(_) => ApiError::NotFound("Book not found".to_string()),
            ReviewError::ReviewNotFound(_) => ApiError::NotFound("Review not found".to_string()),
            ReviewError::NotAuthor => ApiError::Forbidden(
                "Unauthorized. You can only modify your own reviews.".to_string(),
            ),
            ReviewError::DuplicateReview => ApiError::DuplicateReview,
            ReviewError::Store(e) => ApiError::Port(e),
            ReviewError::Aggregation(e) => ApiError::AggregationFailure(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if status.is_server_error() {
            error!("Request failed: {:?}", self);
            json!({ "success": false, "error": "Internal server error" })
        } else {
            debug!(status = status.as_u16(), "Request rejected: {}", self);
            match &self {
                ApiError::Validation(errors) => json!({
                    "success": false,
                    "error": self.to_string(),
                    "errors": errors,
                }),
                _ => json!({ "success": false, "error": self.to_string() }),
            }
        };
        (status, Json(body)).into_response()
    }
}
