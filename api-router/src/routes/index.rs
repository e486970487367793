use std::path::PathBuf;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::json_body;
use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub root_path: PathBuf,
}

/// Builds the index under `root_path` with a configuration derived for it.
pub async fn build_index(
    State(state): State<ApiState>,
    payload: Result<Json<IndexRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let IndexRequest { root_path } = json_body(payload)?;
    let is_dir = tokio::fs::metadata(&root_path)
        .await
        .is_ok_and(|metadata| metadata.is_dir());
    if !is_dir {
        return Err(ApiError::ValidationError(format!(
            "root_path {} is not an existing directory",
            root_path.display()
        )));
    }

    info!(root = %root_path.display(), "Starting index build");
    state
        .dispatcher
        .build_index(&state.config, &root_path)
        .await?;

    Ok((StatusCode::OK, Json(json!({ "status": "success" }))))
}
