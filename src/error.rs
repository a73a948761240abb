//! 统一的 API 错误类型：以 `{"detail": ...}` JSON 返回。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::storage::StorageError;

pub const FILE_NOT_FOUND: &str = "File not found";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    PayloadTooLarge(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::Internal(msg) => msg,
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidName => ApiError::BadRequest("invalid file name".into()),
            StorageError::NotFound => ApiError::NotFound(FILE_NOT_FOUND.into()),
            err @ StorageError::Write { .. } => ApiError::Internal(err.to_string()),
            StorageError::Io(err) => ApiError::Internal(err.to_string()),
        }
    }
}
