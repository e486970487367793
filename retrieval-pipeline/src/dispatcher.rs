use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use common::{
    error::AppError,
    storage::store::DatasetStore,
    utils::config::AppConfig,
};
use futures::{future::try_join_all, StreamExt};
use tracing::{info, instrument};

use crate::{
    engine::{
        BasicQuery, FragmentStream, GraphEngine, GraphQuery, IndexedDataset, IndexedTable,
        StrategyCall,
    },
    prompt_tune::{IndexingPrompts, PromptTuneParams},
    search::{SearchKind, SearchRequest, SearchResult, ValidSearch},
};

/// Routes searches to the engine with strategy-specific argument shaping.
#[derive(Clone)]
pub struct StrategyDispatcher {
    engine: Arc<dyn GraphEngine>,
    store: DatasetStore,
}

impl StrategyDispatcher {
    pub fn new(engine: Arc<dyn GraphEngine>, store: DatasetStore) -> Self {
        Self { engine, store }
    }

    /// Single-shot search against the configured dataset root.
    #[instrument(skip_all, fields(kind = %kind))]
    pub async fn invoke(
        &self,
        config: &AppConfig,
        kind: SearchKind,
        request: &SearchRequest,
    ) -> Result<SearchResult, AppError> {
        let roots = [config.dataset_root.clone()];
        self.invoke_multi_index(config, kind, &roots, request).await
    }

    /// Streamed search against the configured dataset root.
    #[instrument(skip_all, fields(kind = %kind))]
    pub async fn invoke_streaming(
        &self,
        config: &AppConfig,
        kind: SearchKind,
        request: &SearchRequest,
    ) -> Result<FragmentStream, AppError> {
        let roots = [config.dataset_root.clone()];
        self.invoke_multi_index_streaming(config, kind, &roots, request)
            .await
    }

    #[instrument(skip_all, fields(kind = %kind, indexes = roots.len()))]
    pub async fn invoke_multi_index(
        &self,
        config: &AppConfig,
        kind: SearchKind,
        roots: &[PathBuf],
        request: &SearchRequest,
    ) -> Result<SearchResult, AppError> {
        let call = self.prepare(kind, roots, request).await?;
        let result = self
            .engine
            .search(config, call)
            .await
            .map_err(|err| AppError::retrieval(kind, err))?;
        info!("Search completed");
        Ok(result)
    }

    #[instrument(skip_all, fields(kind = %kind, indexes = roots.len()))]
    pub async fn invoke_multi_index_streaming(
        &self,
        config: &AppConfig,
        kind: SearchKind,
        roots: &[PathBuf],
        request: &SearchRequest,
    ) -> Result<FragmentStream, AppError> {
        let call = self.prepare(kind, roots, request).await?;
        let fragments = self
            .engine
            .search_streaming(config, call)
            .await
            .map_err(|err| AppError::retrieval(kind, err))?;

        Ok(Box::pin(fragments.map(move |item| {
            item.map_err(|err| AppError::retrieval(kind, err))
        })))
    }

    /// Runs an index build with a configuration derived for `root`.
    ///
    /// The shared `config` is only read. Cached tables for `root` are dropped
    /// when the build starts and again when it ends, whatever the outcome.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub async fn build_index(&self, config: &AppConfig, root: &Path) -> Result<(), AppError> {
        let derived = config.with_dataset_root(root);
        let _guard = self.store.begin_build(root);
        self.engine
            .build_index(&derived)
            .await
            .map_err(AppError::indexing)?;
        info!("Index build finished");
        Ok(())
    }

    #[instrument(skip_all, fields(root = %params.root.display()))]
    pub async fn generate_indexing_prompts(
        &self,
        config: &AppConfig,
        params: PromptTuneParams,
    ) -> Result<IndexingPrompts, AppError> {
        self.engine
            .generate_indexing_prompts(config, params)
            .await
            .map_err(AppError::prompt_tuning)
    }

    async fn prepare(
        &self,
        kind: SearchKind,
        roots: &[PathBuf],
        request: &SearchRequest,
    ) -> Result<StrategyCall, AppError> {
        let search = request.validate()?;
        if roots.is_empty() {
            return Err(AppError::Validation(
                "at least one dataset root is required".into(),
            ));
        }

        let indexes = try_join_all(roots.iter().map(|root| async move {
            let dataset = self.store.load(root).await?;
            Ok::<_, AppError>(IndexedDataset::new(root, dataset))
        }))
        .await?;

        Ok(shape_call(kind, search, indexes))
    }
}

/// Builds the argument set for `kind`. Global search always enables dynamic
/// community selection; basic search keeps only text units and the query.
pub fn shape_call(
    kind: SearchKind,
    search: ValidSearch,
    indexes: Vec<IndexedDataset>,
) -> StrategyCall {
    match kind {
        SearchKind::Local => StrategyCall::Local(graph_query(search, indexes)),
        SearchKind::Global => StrategyCall::Global {
            query: graph_query(search, indexes),
            dynamic_community_selection: true,
        },
        SearchKind::Drift => StrategyCall::Drift(graph_query(search, indexes)),
        SearchKind::Basic => StrategyCall::Basic(BasicQuery {
            text_units: indexes
                .into_iter()
                .map(|index| IndexedTable {
                    table: Arc::clone(&index.dataset.text_units),
                    name: index.name,
                })
                .collect(),
            query: search.query,
        }),
    }
}

fn graph_query(search: ValidSearch, indexes: Vec<IndexedDataset>) -> GraphQuery {
    GraphQuery {
        indexes,
        community_level: search.community_level,
        response_type: search.response_type,
        query: search.query,
        result_limit: search.result_limit,
    }
}
