use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    index::build_index,
    liveness::live,
    prompts::generate_prompts,
    readiness::ready,
    search::{search, search_multi},
    stream::search_stream,
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

pub use routes::{index::IndexRequest, prompts::PromptTuneRequest, search::MultiSearchRequest};

/// Router for the gateway API
pub fn api_routes<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    // Protected API endpoints (require the gateway key when one is configured)
    let protected = Router::new()
        .route("/search/{kind}", post(search))
        .route("/search/{kind}/stream", post(search_stream))
        .route("/search/{kind}/multi", post(search_multi))
        .route("/index", post(build_index))
        .route("/prompts/generate", post(generate_prompts))
        .layer(DefaultBodyLimit::max(app_state.config.max_body_bytes))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use common::{
        storage::{
            dataset::TableName,
            fixtures::{remove_table, SampleGraph},
        },
        utils::config::{test_config, AppConfig},
    };
    use futures::StreamExt;
    use retrieval_pipeline::{
        testing::{RecordingEngine, StreamTracker},
        StrategyCall,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Harness {
        dir: TempDir,
        engine: Arc<RecordingEngine>,
        app: Router,
    }

    fn harness_with(engine: RecordingEngine, configure: impl FnOnce(&mut AppConfig)) -> Harness {
        let dir = TempDir::new().unwrap();
        SampleGraph::new(3, 20).write(dir.path()).unwrap();
        let mut config = test_config(dir.path());
        configure(&mut config);

        let engine = Arc::new(engine);
        let state = ApiState::new(Arc::new(config), engine.clone());
        let app = api_routes(&state).with_state(state);
        Harness {
            dir,
            engine,
            app,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingEngine::default(), |_| {})
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    #[tokio::test]
    async fn search_returns_response_and_context() {
        let h = harness();

        let response = h
            .app
            .oneshot(post_json("/search/local", &json!({ "query": "storage" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["response"], json!("local answer for storage"));
        assert!(body["context"].is_object());
        assert_eq!(h.engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn null_options_use_the_defaults() {
        let h = harness();

        let response = h
            .app
            .oneshot(post_json(
                "/search/local",
                &json!({ "query": "q", "community_level": null, "response_type": null }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let calls = h.engine.calls();
        let StrategyCall::Local(query) = &calls[0] else {
            panic!("expected a local call, got {calls:?}");
        };
        assert_eq!(query.community_level, 1);
        assert_eq!(query.response_type, "json");
    }

    #[tokio::test]
    async fn unknown_kind_is_a_validation_error() {
        let h = harness();

        let response = h
            .app
            .oneshot(post_json("/search/hybrid", &json!({ "query": "q" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], json!("error"));
        assert!(body["error"].as_str().unwrap().contains("hybrid"));
        assert!(h.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_bodies_get_the_standard_error_shape() {
        let h = harness();

        let response = h
            .app
            .oneshot(post_json("/search/local", &json!({ "community_level": 1 })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["status"], json!("error"));
    }

    #[tokio::test]
    async fn negative_community_level_is_rejected() {
        let h = harness();

        let response = h
            .app
            .oneshot(post_json(
                "/search/global",
                &json!({ "query": "q", "community_level": -1 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_table_is_a_server_error_naming_the_table() {
        let h = harness();
        remove_table(h.dir.path(), TableName::Covariates).unwrap();

        let response = h
            .app
            .oneshot(post_json("/search/local", &json!({ "query": "q" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("covariates"));
    }

    #[tokio::test]
    async fn stream_emits_fragments_then_close() {
        let h = harness_with(RecordingEngine::with_fragments(["The ", "answer."]), |_| {});

        let response = h
            .app
            .oneshot(post_json("/search/local/stream", &json!({ "query": "q" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert_eq!(text.matches("event: fragment").count(), 2);
        assert!(text.contains(r#"data: {"content":"The "}"#));
        assert!(text.contains("event: close_stream"));
        assert!(!text.contains("event: error"));
    }

    #[tokio::test]
    async fn stream_failure_ends_with_an_error_event() {
        let engine = RecordingEngine::with_fragments(["a", "b"]).fail_stream_after(1);
        let h = harness_with(engine, |_| {});

        let response = h
            .app
            .oneshot(post_json("/search/drift/stream", &json!({ "query": "q" })))
            .await
            .unwrap();

        let text = body_text(response).await;
        assert_eq!(text.matches("event: fragment").count(), 1);
        assert!(text.contains("event: error"));
        assert!(text.contains("drift search failed"));
        assert!(!text.contains("event: close_stream"));
    }

    #[tokio::test]
    async fn stream_errors_before_the_first_fragment_are_json() {
        let h = harness();
        remove_table(h.dir.path(), TableName::Entities).unwrap();

        let response = h
            .app
            .oneshot(post_json("/search/local/stream", &json!({ "query": "q" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("entities"));
    }

    #[tokio::test]
    async fn dropping_the_stream_response_stops_fragment_production() {
        let tracker = Arc::new(StreamTracker::default());
        let h = harness_with(
            RecordingEngine::with_fragments(["one ", "two ", "three"])
                .with_stream_tracker(Arc::clone(&tracker)),
            |_| {},
        );

        let response = h
            .app
            .oneshot(post_json("/search/local/stream", &json!({ "query": "q" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&first).contains("event: fragment"));
        let produced = tracker.produced();

        drop(body);

        assert!(tracker.dropped());
        assert_eq!(tracker.produced(), produced);
        assert!(produced < 3);
    }

    #[tokio::test]
    async fn multi_search_requires_roots() {
        let h = harness();

        let response = h
            .app
            .oneshot(post_json(
                "/search/basic/multi",
                &json!({ "query": "q", "roots": [] }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn multi_search_passes_every_root() {
        let h = harness();
        let other = TempDir::new().unwrap();
        SampleGraph::new(2, 5).write(other.path()).unwrap();

        let response = h
            .app
            .oneshot(post_json(
                "/search/local/multi",
                &json!({ "query": "q", "roots": [h.dir.path(), other.path()] }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["context"]["indexes"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn index_requires_an_existing_directory() {
        let h = harness();

        let response = h
            .app
            .oneshot(post_json(
                "/index",
                &json!({ "root_path": "/definitely/not/a/dataset" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(h.engine.built_roots().is_empty());
    }

    #[tokio::test]
    async fn index_builds_the_requested_root() {
        let h = harness();
        let target = TempDir::new().unwrap();

        let response = h
            .app
            .oneshot(post_json("/index", &json!({ "root_path": target.path() })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "success" }));
        assert_eq!(h.engine.built_roots(), vec![target.path().to_path_buf()]);
    }

    #[tokio::test]
    async fn failed_builds_surface_the_cause() {
        let h = harness_with(RecordingEngine::failing("exit status 2"), |_| {});
        let target = TempDir::new().unwrap();

        let response = h
            .app
            .oneshot(post_json("/index", &json!({ "root_path": target.path() })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("exit status 2"));
    }

    #[tokio::test]
    async fn prompt_generation_rejects_unknown_selection_methods() {
        let h = harness();

        let response = h
            .app
            .oneshot(post_json(
                "/prompts/generate",
                &json!({ "root": "/data", "selection_method": "SMART" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(h.engine.tuned().is_empty());
    }

    #[tokio::test]
    async fn failed_prompt_generation_surfaces_the_cause() {
        let h = harness_with(RecordingEngine::failing("model quota exceeded"), |_| {});

        let response = h
            .app
            .oneshot(post_json("/prompts/generate", &json!({ "root": "/data" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        let error = body["error"].as_str().unwrap();
        assert!(error.starts_with("Prompt generation failed"), "{error}");
        assert!(error.contains("model quota exceeded"), "{error}");
        assert_eq!(body["status"], json!("error"));
    }

    #[tokio::test]
    async fn prompt_generation_returns_prompts() {
        let h = harness();

        let response = h
            .app
            .oneshot(post_json(
                "/prompts/generate",
                &json!({ "root": "/data", "selection_method": "top" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["prompts"]["entity_extraction"],
            json!("extract entities from /data")
        );
        assert_eq!(h.engine.tuned().len(), 1);
    }

    #[tokio::test]
    async fn gateway_key_protects_everything_but_probes() {
        let h = harness_with(RecordingEngine::default(), |config| {
            config.api_key = Some("secret".into());
        });

        let live = h
            .app
            .clone()
            .oneshot(Request::get("/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(live.status(), StatusCode::OK);

        let anonymous = h
            .app
            .clone()
            .oneshot(post_json("/search/local", &json!({ "query": "q" })))
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let mut request = post_json("/search/local", &json!({ "query": "q" }));
        request
            .headers_mut()
            .insert("Authorization", "Bearer secret".parse().unwrap());
        let authorized = h.app.oneshot(request).await.unwrap();
        assert_eq!(authorized.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let h = harness_with(RecordingEngine::default(), |config| {
            config.max_body_bytes = 64;
        });

        let response = h
            .app
            .oneshot(post_json(
                "/search/local",
                &json!({ "query": "q".repeat(500) }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn readiness_reflects_the_dataset_tables() {
        let h = harness();

        let ready = h
            .app
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::OK);

        remove_table(h.dir.path(), TableName::TextUnits).unwrap();
        let not_ready = h
            .app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_json(not_ready).await["reason"]
            .as_str()
            .unwrap()
            .contains("text_units"));
    }
}
