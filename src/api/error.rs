use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::retrieval::RetrievalError;
use crate::services::separation::JobError;
use crate::utils::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Separation job failed: {0}")]
    Job(#[from] JobError),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::BadRequest(e.message)
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
        } else {
            AppError::BadRequest(e.body_text())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Job(e) => job_error_response(e),
            AppError::Retrieval(e) => match e {
                RetrievalError::NotFound => (StatusCode::NOT_FOUND, "File not found".to_string()),
                RetrievalError::InvalidPath(_) => {
                    (StatusCode::BAD_REQUEST, "Invalid file path".to_string())
                }
                RetrievalError::Storage(e) => {
                    tracing::error!("Storage error while serving file: {:?}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error".to_string(),
                    )
                }
            },
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

fn job_error_response(e: JobError) -> (StatusCode, String) {
    match e {
        JobError::EmptyUpload => (StatusCode::BAD_REQUEST, "Uploaded file is empty".to_string()),
        e @ JobError::ReservedName(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        JobError::UploadTooLarge { .. } => (
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body exceeds the maximum allowed limit".to_string(),
        ),
        JobError::UploadRead(e) if is_payload_too_large(&e) => (
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body exceeds the maximum allowed limit".to_string(),
        ),
        JobError::UploadRead(e) => (StatusCode::BAD_REQUEST, format!("Upload failed: {}", e)),
        JobError::Timeout(limit) => {
            tracing::error!("Separation timed out after {:?}", limit);
            (
                StatusCode::GATEWAY_TIMEOUT,
                "Separation did not finish in time".to_string(),
            )
        }
        JobError::Engine(e) => {
            tracing::error!("Engine error: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Audio separation failed".to_string(),
            )
        }
        e @ (JobError::Storage(_) | JobError::UploadWrite { .. } | JobError::Aborted(_)) => {
            tracing::error!("Internal error: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            )
        }
    }
}

fn is_payload_too_large(e: &std::io::Error) -> bool {
    e.get_ref()
        .and_then(|inner| inner.downcast_ref::<MultipartError>())
        .is_some_and(|m| m.status() == StatusCode::PAYLOAD_TOO_LARGE)
}
