//! Typed errors at the scraper, store, and HTTP boundaries.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors a scraper or content loader can raise.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("bad url: {0}")]
    BadUrl(String),

    #[error("content not loaded: {0}")]
    ContentNotLoaded(String),

    #[error("timeout loading {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("data component not found: {0}")]
    DataComponentNotFound(String),

    #[error("data parsing error: {0}")]
    DataParsing(String),
}

impl ScraperError {
    /// The message surfaced on a failed Job's `error_message` field.
    pub fn as_job_error_message(&self) -> String {
        self.to_string()
    }
}

/// Errors from the durable store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("mongo error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("bson serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),

    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),
}

/// Error returned from HTTP handlers, mapped to a status code at the edge.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, message).into_response()
    }
}
