use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Always 200 while the process can serve requests. Never touches the dataset.
pub async fn live() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
