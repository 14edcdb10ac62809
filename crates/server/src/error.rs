//! API error type and HTTP mapping
//!
//! Validation and not-found map to 4xx, signature failures to 401 with no
//! body details, everything internal to 5xx. Handlers never trust body
//! types: input validation happens at this edge.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::envelope::ApiResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error")]
    Internal(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            // No detail leaks on auth failures
            ApiError::Unauthorized => ApiResponse::error("Unauthorized"),
            ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                ApiResponse::error("Internal server error")
            }
            other => ApiResponse::error(other.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

impl From<dialflow_store::StoreError> for ApiError {
    fn from(err: dialflow_store::StoreError) -> Self {
        use dialflow_store::StoreError;
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::Conflict(what) => ApiError::Conflict(what),
            StoreError::Validation(what) => ApiError::Validation(what),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<dialflow_engine::EngineError> for ApiError {
    fn from(err: dialflow_engine::EngineError) -> Self {
        use dialflow_engine::EngineError;
        match err {
            EngineError::Validation(what) => ApiError::Validation(what),
            EngineError::NotFound(what) => ApiError::NotFound(what),
            EngineError::Conflict(what) => ApiError::Conflict(what),
            EngineError::Upstream(what) => ApiError::Upstream(what),
            EngineError::Timeout(what) => ApiError::Timeout(what),
            EngineError::Store(e) => ApiError::from(e),
            EngineError::Internal(what) => ApiError::Internal(what),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
