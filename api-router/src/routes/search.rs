use std::path::PathBuf;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use retrieval_pipeline::{SearchRequest, SearchResult};
use serde::Deserialize;
use tracing::info;

use super::{json_body, parse_kind};
use crate::{api_state::ApiState, error::ApiError};

/// A search over several dataset roots at once.
#[derive(Debug, Deserialize)]
pub struct MultiSearchRequest {
    #[serde(flatten)]
    pub search: SearchRequest,
    pub roots: Vec<PathBuf>,
}

pub async fn search(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResult>, ApiError> {
    let kind = parse_kind(&kind)?;
    let request = json_body(payload)?;
    info!(kind = %kind, query_chars = request.query.len(), "Received search request");

    let result = state
        .dispatcher
        .invoke(&state.config, kind, &request)
        .await?;
    Ok(Json(result))
}

pub async fn search_multi(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    payload: Result<Json<MultiSearchRequest>, JsonRejection>,
) -> Result<Json<SearchResult>, ApiError> {
    let kind = parse_kind(&kind)?;
    let request = json_body(payload)?;
    if request.roots.is_empty() {
        return Err(ApiError::ValidationError(
            "roots must list at least one dataset root".to_string(),
        ));
    }
    info!(kind = %kind, indexes = request.roots.len(), "Received multi-index search request");

    let result = state
        .dispatcher
        .invoke_multi_index(&state.config, kind, &request.roots, &request.search)
        .await?;
    Ok(Json(result))
}
