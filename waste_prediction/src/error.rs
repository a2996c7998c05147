use crate::classifier::ClassifierError;
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const MEGABYTE: usize = 1024 * 1024;

/// Upload size limit, rendered the way clients see it in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteLimit(pub usize);

impl fmt::Display for ByteLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= MEGABYTE && self.0 % MEGABYTE == 0 {
            write!(f, "{}MB", self.0 / MEGABYTE)
        } else {
            write!(f, "{} bytes", self.0)
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No image file provided")]
    MissingImage,
    #[error("No file selected")]
    NoFileSelected,
    #[error("Empty image file")]
    EmptyImage,
    #[error("File too large (max {0})")]
    FileTooLarge(ByteLimit),
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
    #[error("Model not loaded")]
    ModelUnavailable,
    #[error("Failed to process image")]
    Processing(#[source] ClassifierError),
    #[error("Internal server error")]
    Internal(String),
}

#[derive(Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn from_multipart(err: MultipartError, limit: ByteLimit) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::FileTooLarge(limit)
        } else {
            ApiError::InvalidUpload(err.body_text())
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingImage
            | ApiError::NoFileSelected
            | ApiError::EmptyImage
            | ApiError::FileTooLarge(_)
            | ApiError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Processing(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ClassifierError> for ApiError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::ModelUnavailable(_) => ApiError::ModelUnavailable,
            other => ApiError::Processing(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Details stay in the log, clients only get the generic message.
        match &self {
            ApiError::Processing(source) => tracing::error!("Prediction failed: {}", source),
            ApiError::Internal(detail) => tracing::error!("Internal error: {}", detail),
            ApiError::ModelUnavailable => tracing::warn!("Prediction refused, model not loaded"),
            other => tracing::warn!("Rejected request: {}", other),
        }

        let body = ErrorBody {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
