use std::{path::Path, pin::Pin, sync::Arc};

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::dataset::{Dataset, Table},
    utils::config::AppConfig,
};
use futures::Stream;

use crate::{
    prompt_tune::{IndexingPrompts, PromptTuneParams},
    search::{Fragment, SearchKind, SearchResult},
};

/// Lazy, finite, non-restartable sequence of answer fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, AppError>> + Send>>;

/// A loaded dataset labelled with the root it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDataset {
    pub name: String,
    pub dataset: Arc<Dataset>,
}

impl IndexedDataset {
    pub fn new(root: &Path, dataset: Arc<Dataset>) -> Self {
        Self {
            name: root.display().to_string(),
            dataset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedTable {
    pub name: String,
    pub table: Arc<Table>,
}

/// Arguments shared by the graph-backed strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQuery {
    pub indexes: Vec<IndexedDataset>,
    pub community_level: u32,
    pub response_type: String,
    pub query: String,
    pub result_limit: usize,
}

/// Basic search sees only text units and the raw query.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicQuery {
    pub text_units: Vec<IndexedTable>,
    pub query: String,
}

/// The exact argument set handed to a [`GraphEngine`] for one search.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyCall {
    Local(GraphQuery),
    Global {
        query: GraphQuery,
        dynamic_community_selection: bool,
    },
    Drift(GraphQuery),
    Basic(BasicQuery),
}

impl StrategyCall {
    pub const fn kind(&self) -> SearchKind {
        match self {
            Self::Local(_) => SearchKind::Local,
            Self::Global { .. } => SearchKind::Global,
            Self::Drift(_) => SearchKind::Drift,
            Self::Basic(_) => SearchKind::Basic,
        }
    }

    pub fn query_text(&self) -> &str {
        match self {
            Self::Local(query) | Self::Global { query, .. } | Self::Drift(query) => &query.query,
            Self::Basic(basic) => &basic.query,
        }
    }
}

/// The retrieval, indexing and prompt-tuning operations the gateway consumes.
#[async_trait]
pub trait GraphEngine: Send + Sync {
    async fn search(&self, config: &AppConfig, call: StrategyCall)
        -> Result<SearchResult, AppError>;

    /// Resolves once the strategy is ready to produce fragments.
    async fn search_streaming(
        &self,
        config: &AppConfig,
        call: StrategyCall,
    ) -> Result<FragmentStream, AppError>;

    /// Builds the index under `config.dataset_root`. `config` is a derived copy.
    async fn build_index(&self, config: &AppConfig) -> Result<(), AppError>;

    async fn generate_indexing_prompts(
        &self,
        config: &AppConfig,
        params: PromptTuneParams,
    ) -> Result<IndexingPrompts, AppError>;
}
