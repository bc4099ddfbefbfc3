use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::comparator::CompareError;
use crate::extractor::ExtractError;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("payload too large: max {0}MB allowed")]
    PayloadTooLarge(usize),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,
}

/// Body of every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub msg: String,
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::MissingField(_) | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Extract(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ServerError::Extract(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Compare(CompareError::InvalidThreshold(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::Compare(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::MissingField(_) => "MISSING_FIELD",
            ServerError::BadRequest(_) => "BAD_REQUEST",
            ServerError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ServerError::Extract(ExtractError::Decode(_) | ExtractError::EmptyImage) => {
                "DECODE_ERROR"
            }
            ServerError::Extract(_) => "BACKEND_ERROR",
            ServerError::Compare(CompareError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
            ServerError::Compare(CompareError::InvalidThreshold(_)) => "INTERNAL_ERROR",
            ServerError::Compare(_) => "INVALID_EMBEDDING",
            ServerError::Internal(_) => "INTERNAL_ERROR",
            ServerError::Timeout(_) => "REQUEST_TIMEOUT",
            ServerError::NotFound => "NOT_FOUND",
            ServerError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
        }
    }

    /// Map a multipart read failure, keeping the body-limit case distinct.
    pub fn from_multipart(err: MultipartError, max_upload_mb: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge(max_upload_mb)
        } else {
            ServerError::BadRequest(err.body_text())
        }
    }

    /// Map a JSON body rejection, keeping the body-limit case distinct.
    pub fn from_json(rejection: JsonRejection, max_upload_mb: usize) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge(max_upload_mb)
        } else {
            ServerError::BadRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::debug!("rejected request: {}", self);
        }

        let body = ErrorBody {
            success: false,
            code: self.error_code().to_string(),
            msg: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<MultipartRejection> for ServerError {
    fn from(rejection: MultipartRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}
