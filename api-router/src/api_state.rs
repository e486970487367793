use std::sync::Arc;

use common::{storage::store::DatasetStore, utils::config::AppConfig};
use retrieval_pipeline::{GraphEngine, StrategyDispatcher};

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<AppConfig>,
    pub dispatcher: StrategyDispatcher,
}

impl ApiState {
    pub fn new(config: Arc<AppConfig>, engine: Arc<dyn GraphEngine>) -> Self {
        let store = DatasetStore::from_config(&config);
        Self {
            dispatcher: StrategyDispatcher::new(engine, store),
            config,
        }
    }
}
