use axum::{
    Json,
    extract::{
        path::ErrorKind,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{repository::RepositoryError, storage::StorageError};

/// AppResult
///
/// The return type of every fallible handler.
pub type AppResult<T> = Result<T, AppError>;

/// AppError
///
/// The fixed error taxonomy of the API. Handlers and extractors map store,
/// storage, and token failures onto one of these variants; `IntoResponse`
/// turns it into a status code and a `{"message": ...}` JSON body.
///
/// Variants that represent server faults (`Storage`, `Internal`) log their
/// detail and answer with a generic message so internals never leak.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 401: missing, malformed, expired or badly signed credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// 403: authenticated but not permitted.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// 404
    #[error("not found: {0}")]
    NotFound(String),

    /// 400 with field-level messages.
    #[error("validation failed ({} errors)", .0.len())]
    Validation(Vec<FieldError>),

    /// 400
    #[error("bad request: {0}")]
    BadRequest(String),

    /// 400: a unique field already holds this value.
    #[error("conflict: {0}")]
    Conflict(String),

    /// 413
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// 500: a dependency (e.g. the object store) was never configured.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// 500: the object store rejected or failed an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// 500
    #[error("internal error: {0}")]
    Internal(String),
}

/// FieldError
///
/// One failed validation rule, as reported in the `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// ErrorBody
///
/// Wire format of every error response.
#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotConfigured(_) | AppError::Storage(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            AppError::Validation(errors) => ErrorBody {
                message: "Validation failed".to_string(),
                errors: Some(errors),
            },
            AppError::Storage(detail) => {
                tracing::error!(error = %detail, "object storage failure");
                ErrorBody {
                    message: "File upload failed".to_string(),
                    errors: None,
                }
            }
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                ErrorBody {
                    message: "Server error".to_string(),
                    errors: None,
                }
            }
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Conflict(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::NotConfigured(msg) => ErrorBody {
                message: msg,
                errors: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Collects every failed rule into a sorted list of `FieldError`s.
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<FieldError> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| FieldError {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Invalid value".to_string()),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::Validation(details)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotConfigured => {
                AppError::NotConfigured("File storage not configured".to_string())
            }
            StorageError::Upload(detail) => AppError::Storage(detail),
        }
    }
}

/// Store failures that a handler did not translate itself.
impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Duplicate(field) => {
                AppError::Conflict(format!("A record with this {} already exists", field))
            }
            RepositoryError::MissingReference(entity) => {
                AppError::NotFound(format!("Referenced {} not found", entity))
            }
            RepositoryError::Database(e) => AppError::Internal(format!("database error: {}", e)),
        }
    }
}

/// Body rejections from `AppJson`. The parser detail is logged, not returned.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected JSON body");

        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge("Request body is too large".to_string());
        }

        let message = match rejection {
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
            JsonRejection::JsonDataError(_) => "Request body has fields of the wrong type",
            JsonRejection::MissingJsonContentType(_) => {
                "Expected a JSON body with Content-Type: application/json"
            }
            _ => "Could not read request body",
        };
        AppError::BadRequest(message.to_string())
    }
}

/// Path rejections from `AppPath`.
impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(inner) => {
                let message = match inner.kind() {
                    ErrorKind::ParseErrorAtKey { key, .. } => {
                        format!("Invalid value for `{}` in URL", key)
                    }
                    _ => "Invalid URL parameter".to_string(),
                };
                AppError::BadRequest(message)
            }
            // A route/extractor mismatch is a server bug.
            other => AppError::Internal(other.body_text()),
        }
    }
}
