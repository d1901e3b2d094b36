//! Error types.
//!
//! Taxonomy: malformed identifiers are the client's fault (400); upstream
//! not-found is not an error at all (it surfaces as an empty result in the
//! services layer and never reaches the boundary); provider/transport
//! faults are server errors (500) without leaking upstream internals.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::clients::upstream::UpstreamError;
use crate::models::identifier::DecodeError;

/// Failures a resolution operation can surface.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The caller supplied a malformed identifier.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The upstream provider or transport failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// API error type
///
/// Absent entities are not errors here: detail and children handlers
/// answer 200 with an absent/empty body, so there is no 404 variant.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Decode(e) => ApiError::BadRequest(e.to_string()),
            // Not-found never reaches the boundary as an error; anything
            // else from upstream is a server-side fault here.
            ResolveError::Upstream(e) => ApiError::Internal(format!("upstream failure: {e}")),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        ApiError::from(ResolveError::Upstream(err))
    }
}

impl From<DecodeError> for ApiError {
    fn from(err: DecodeError) -> Self {
        ApiError::from(ResolveError::Decode(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
