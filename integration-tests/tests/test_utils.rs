use std::{collections::HashSet, path::Path, sync::Arc};

use api_router::{api_routes, api_state::ApiState};
use axum::{
    body::{to_bytes, Body},
    http::Request,
    response::Response,
    Router,
};
use common::{
    storage::{
        dataset::load_dataset,
        fixtures::SampleGraph,
        types::{community::Community, entity::Entity, GraphRecord},
    },
    utils::config::{test_config, AppConfig},
};
use retrieval_pipeline::{
    testing::{RecordingEngine, ScriptedModel},
    GraphEngine, GraphRagEngine,
};
use serde_json::Value;
use tempfile::TempDir;

/// A dataset root with the sample graph written into it.
pub fn sample_dataset(communities: usize, entities: usize) -> TempDir {
    let dir = TempDir::new().expect("Failed to create dataset root");
    SampleGraph::new(communities, entities)
        .write(dir.path())
        .expect("Failed to write sample dataset");
    dir
}

pub fn config_for(root: &Path) -> Arc<AppConfig> {
    Arc::new(test_config(root))
}

/// The full gateway backed by the bundled engine and a scripted model.
pub fn graphrag_app(config: Arc<AppConfig>, model: ScriptedModel) -> Router {
    let engine = GraphRagEngine::new(Arc::new(model)).expect("Failed to build engine");
    app_with_engine(config, Arc::new(engine))
}

pub fn recording_app(config: Arc<AppConfig>, engine: Arc<RecordingEngine>) -> Router {
    app_with_engine(config, engine)
}

pub fn app_with_engine(config: Arc<AppConfig>, engine: Arc<dyn GraphEngine>) -> Router {
    let state = ApiState::new(config, engine);
    api_routes(&state).with_state(state)
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).expect("Body is not JSON")
}

/// Concatenated `content` of every `fragment` event in an SSE body.
pub fn fragment_text(sse: &str) -> String {
    sse.split("\n\n")
        .filter(|block| block.lines().any(|line| line == "event: fragment"))
        .filter_map(|block| block.lines().find_map(|line| line.strip_prefix("data: ")))
        .map(|data| {
            let fragment: Value = serde_json::from_str(data).expect("Fragment is not JSON");
            fragment["content"]
                .as_str()
                .expect("Fragment without content")
                .to_string()
        })
        .collect()
}

/// Entity and community identifiers stored under `root`.
pub fn dataset_ids(root: &Path) -> (HashSet<String>, HashSet<String>) {
    let dataset = load_dataset(root).expect("Failed to load dataset");
    let entities = Entity::from_table(&dataset.entities)
        .expect("Failed to parse entities")
        .into_iter()
        .map(|entity| entity.id)
        .collect();
    let communities = Community::from_table(&dataset.communities)
        .expect("Failed to parse communities")
        .into_iter()
        .map(|community| community.community)
        .collect();
    (entities, communities)
}

/// Values of `field` for every record listed under `section` of a context.
pub fn context_values(context: &Value, section: &str, field: &str) -> Vec<String> {
    context[section]
        .as_array()
        .map(|records| {
            records
                .iter()
                .filter_map(|record| record[field].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
