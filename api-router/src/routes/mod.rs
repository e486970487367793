pub mod index;
pub mod liveness;
pub mod prompts;
pub mod readiness;
pub mod search;
pub mod stream;

use axum::{extract::rejection::JsonRejection, Json};
use retrieval_pipeline::SearchKind;

use crate::error::ApiError;

/// Unwraps a JSON body, turning extractor rejections into 400s with the
/// standard error body.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    let Json(body) = payload?;
    Ok(body)
}

pub(crate) fn parse_kind(raw: &str) -> Result<SearchKind, ApiError> {
    raw.parse().map_err(ApiError::ValidationError)
}
