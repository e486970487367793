use std::sync::Arc;

use api_router::{api_routes, api_state::ApiState};
use axum::Router;
use common::utils::config::{get_config, AppConfig};
use retrieval_pipeline::{llm::OpenAiLanguageModel, GraphEngine, GraphRagEngine};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config; any error here is fatal
    let config = Arc::new(get_config()?);
    info!(
        dataset_root = %config.dataset_root.display(),
        llm_model = %config.llm.model,
        embedding_model = %config.embeddings.model,
        dataset_cache = config.dataset_cache,
        "Configuration loaded"
    );

    let model = Arc::new(OpenAiLanguageModel::from_config(&config));
    let engine = Arc::new(GraphRagEngine::new(model)?);

    let app = build_app(Arc::clone(&config), engine);

    let serve_address = format!("{}:{}", config.bind_address, config.http_port);
    info!("Starting server listening on {serve_address}");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_app(config: Arc<AppConfig>, engine: Arc<dyn GraphEngine>) -> Router {
    let api_state = ApiState::new(config, engine);
    Router::new()
        .merge(api_routes(&api_state))
        .layer(TraceLayer::new_for_http())
        .with_state(api_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use common::{storage::fixtures::SampleGraph, utils::config::test_config};
    use retrieval_pipeline::testing::ScriptedModel;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_startup_with_sample_dataset() {
        let dir = TempDir::new().expect("failed to create temp dataset root");
        SampleGraph::new(3, 50)
            .write(dir.path())
            .expect("failed to write sample dataset");
        let config = Arc::new(test_config(dir.path()));

        let model = Arc::new(ScriptedModel::new(
            r#"{"answer": "It serves graph queries.", "references": []}"#,
        ));
        let engine = Arc::new(GraphRagEngine::new(model).expect("engine"));
        let app = build_app(config, engine);

        let ready = app
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .expect("ready request");
        assert_eq!(ready.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::post("/search/local")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "query": "What is the main function of this project?",
                            "community_level": 1,
                            "response_type": "json"
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .expect("search request");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["response"]["answer"], json!("It serves graph queries."));
        assert!(!body["context"]["entities"].as_array().unwrap().is_empty());
    }
}
