use std::path::PathBuf;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use retrieval_pipeline::prompt_tune::{DocSelectionType, PromptTuneParams};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::json_body;
use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct PromptTuneRequest {
    pub root: PathBuf,
    pub chunk_size: Option<usize>,
    pub overlap: Option<usize>,
    pub limit: Option<usize>,
    pub selection_method: Option<String>,
    pub domain: Option<String>,
    pub language: Option<String>,
    pub max_tokens: Option<usize>,
    pub discover_entity_types: Option<bool>,
    pub min_examples_required: Option<usize>,
    pub n_subset_max: Option<usize>,
    pub k: Option<usize>,
}

impl PromptTuneRequest {
    /// Applies the documented defaults. An unknown selection method is
    /// rejected rather than replaced.
    pub fn into_params(self) -> Result<PromptTuneParams, ApiError> {
        let mut params = PromptTuneParams::new(self.root);
        if let Some(method) = self.selection_method {
            params.selection_method = method
                .parse::<DocSelectionType>()
                .map_err(ApiError::ValidationError)?;
        }
        params.chunk_size = self.chunk_size.unwrap_or(params.chunk_size);
        params.overlap = self.overlap.unwrap_or(params.overlap);
        params.limit = self.limit.unwrap_or(params.limit);
        params.max_tokens = self.max_tokens.unwrap_or(params.max_tokens);
        params.discover_entity_types = self
            .discover_entity_types
            .unwrap_or(params.discover_entity_types);
        params.min_examples_required = self
            .min_examples_required
            .unwrap_or(params.min_examples_required);
        params.n_subset_max = self.n_subset_max.unwrap_or(params.n_subset_max);
        params.k = self.k.unwrap_or(params.k);
        params.domain = self.domain;
        params.language = self.language;
        params.validate()?;
        Ok(params)
    }
}

pub async fn generate_prompts(
    State(state): State<ApiState>,
    payload: Result<Json<PromptTuneRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let params = json_body(payload)?.into_params()?;
    info!(
        root = %params.root.display(),
        method = %params.selection_method,
        "Received prompt generation request"
    );

    let prompts = state
        .dispatcher
        .generate_indexing_prompts(&state.config, params)
        .await?;
    Ok(Json(json!({ "prompts": prompts })))
}
