use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    DatasetUnavailable(String),

    #[error("{0}")]
    RetrievalFailed(String),

    #[error("{0}")]
    IndexingFailed(String),

    #[error("{0}")]
    PromptTuningFailed(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::DatasetLoad(_) => {
                tracing::error!(error = %err, "Dataset unavailable");
                Self::DatasetUnavailable(err.to_string())
            }
            AppError::Retrieval { .. } => {
                tracing::error!(error = %err, "Retrieval failed");
                Self::RetrievalFailed(err.to_string())
            }
            AppError::Indexing(_) => {
                tracing::error!(error = %err, "Index build failed");
                Self::IndexingFailed(err.to_string())
            }
            AppError::PromptTuning(_) => {
                tracing::error!(error = %err, "Prompt generation failed");
                Self::PromptTuningFailed(err.to_string())
            }
            _ => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(rejection.body_text())
        } else {
            Self::ValidationError(rejection.body_text())
        }
    }
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InternalError(_)
            | Self::DatasetUnavailable(_)
            | Self::RetrievalFailed(_)
            | Self::IndexingFailed(_)
            | Self::PromptTuningFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The body shared by JSON error responses and SSE `error` events.
    pub fn body(&self) -> ErrorResponse {
        let message = match self {
            Self::InternalError(message)
            | Self::ValidationError(message)
            | Self::Unauthorized(message)
            | Self::PayloadTooLarge(message)
            | Self::DatasetUnavailable(message)
            | Self::RetrievalFailed(message)
            | Self::IndexingFailed(message)
            | Self::PromptTuningFailed(message) => message.clone(),
        };
        ErrorResponse {
            error: message,
            status: "error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::dataset::{DatasetLoadError, TableName};
    use std::fmt::Debug;

    fn assert_status_code<T: IntoResponse + Debug>(response: T, expected_status: StatusCode) {
        let response = response.into_response();
        assert_eq!(response.status(), expected_status);
    }

    #[test]
    fn test_app_error_to_api_error_conversion() {
        let validation = AppError::Validation("invalid input".to_string());
        let api_error = ApiError::from(validation);
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg == "invalid input"));

        let missing = AppError::DatasetLoad(DatasetLoadError {
            table: TableName::Covariates,
            cause: "file not found".into(),
        });
        let api_error = ApiError::from(missing);
        assert!(matches!(&api_error, ApiError::DatasetUnavailable(msg) if msg.contains("covariates")));

        let retrieval = AppError::Retrieval {
            kind: "local".into(),
            cause: "model unreachable".into(),
        };
        let api_error = ApiError::from(retrieval);
        assert!(
            matches!(&api_error, ApiError::RetrievalFailed(msg) if msg == "local search failed: model unreachable")
        );

        let indexing = AppError::Indexing("exit 3".into());
        assert!(matches!(ApiError::from(indexing), ApiError::IndexingFailed(_)));

        let tuning = AppError::PromptTuning("model quota exceeded".into());
        assert!(
            matches!(ApiError::from(tuning), ApiError::PromptTuningFailed(msg) if msg.contains("model quota exceeded"))
        );

        let internal_error = AppError::Io(std::io::Error::other("io error"));
        let api_error = ApiError::from(internal_error);
        assert!(matches!(api_error, ApiError::InternalError(_)));
    }

    #[test]
    fn test_api_error_response_status_codes() {
        assert_status_code(
            ApiError::InternalError("server error".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
        assert_status_code(
            ApiError::ValidationError("invalid input".to_string()),
            StatusCode::BAD_REQUEST,
        );
        assert_status_code(
            ApiError::Unauthorized("not allowed".to_string()),
            StatusCode::UNAUTHORIZED,
        );
        assert_status_code(
            ApiError::PayloadTooLarge("too big".to_string()),
            StatusCode::PAYLOAD_TOO_LARGE,
        );
        assert_status_code(
            ApiError::DatasetUnavailable("missing".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
        assert_status_code(
            ApiError::RetrievalFailed("failed".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
        assert_status_code(
            ApiError::IndexingFailed("failed".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
    }

    #[test]
    fn test_error_messages() {
        let error = ApiError::ValidationError("invalid data format".to_string());
        assert_eq!(error.to_string(), "Validation error: invalid data format");

        let error = ApiError::RetrievalFailed("drift search failed: boom".to_string());
        assert_eq!(error.to_string(), "drift search failed: boom");
    }

    #[test]
    fn test_internal_error_sanitization() {
        let api_error = ApiError::from(AppError::InternalError("db password incorrect".into()));

        assert_eq!(api_error.to_string(), "Internal server error");
        assert_eq!(api_error.body().error, "Internal server error");
        assert_status_code(api_error, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
