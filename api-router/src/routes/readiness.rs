use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::storage::dataset::tables_present;
use serde_json::json;

use crate::api_state::ApiState;

/// Readiness probe: returns 200 if every table exists under the configured
/// dataset root, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    match tables_present(&state.config.dataset_root) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "dataset": "ok" }
            })),
        ),
        Err(missing) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "dataset": "fail" },
                "reason": format!("missing table '{missing}'")
            })),
        ),
    }
}
