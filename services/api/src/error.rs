//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use crate::config::ConfigError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;
use wiki_quiz_core::{GenerationError, PortError, ResolveError};

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// A failure of the request-resolution pipeline.
    #[error("{0}")]
    Resolve(#[from] ResolveError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The JSON body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub detail: String,
    /// Present on 429 responses.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retry_after_minutes: Option<i64>,
}

impl ErrorBody {
    fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            retry_after_minutes: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Resolve(ResolveError::RateLimited {
                retry_after_minutes,
            }) => {
                let body = ErrorBody {
                    detail: self.to_string(),
                    retry_after_minutes: Some(*retry_after_minutes),
                };
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                if let Ok(value) = HeaderValue::from_str(&(retry_after_minutes * 60).to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                return response;
            }
            ApiError::Resolve(ResolveError::ExtractionFailed { .. }) | ApiError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, ErrorBody::new(self.to_string()))
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorBody::new(self.to_string())),
            ApiError::Resolve(ResolveError::GenerationFailed(cause)) => {
                error!("Quiz generation failed: {}", cause);
                let detail = match cause {
                    GenerationError::RateLimitExhausted { .. } => {
                        "The quiz generator is busy right now. Please try again shortly."
                    }
                    _ => "Quiz generation failed.",
                };
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new(detail))
            }
            ApiError::Resolve(ResolveError::Internal(message)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new(message.clone()))
            }
            _ => {
                error!("Request failed: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("An unexpected internal error occurred."),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
