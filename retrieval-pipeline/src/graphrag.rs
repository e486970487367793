use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use common::{
    error::AppError,
    utils::{
        config::{AppConfig, SearchSettings},
        template_engine::{context, TemplateEngine},
    },
};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::{
    context::{
        build_basic_context, build_drift_context, build_global_context, build_local_context,
        BuiltContext, GraphView,
    },
    engine::{FragmentStream, GraphEngine, GraphQuery, StrategyCall},
    indexing::IndexCommand,
    llm::{ChatPrompt, LanguageModel},
    prompt_tune::{self, templates::TUNE_TEMPLATES, IndexingPrompts, PromptTuneParams},
    prompts::{BASIC_SEARCH, DRIFT_SEARCH, GLOBAL_SEARCH, LOCAL_SEARCH, SEARCH_TEMPLATES},
    search::{wants_json, Fragment, SearchKind, SearchResult},
};

/// Basic search has no response type of its own.
const BASIC_RESPONSE_TYPE: &str = "multiple paragraphs";

/// The bundled [`GraphEngine`]: deterministic context assembly over the
/// parquet tables, answers from a [`LanguageModel`], index builds through
/// the configured external command.
#[derive(Clone)]
pub struct GraphRagEngine {
    model: Arc<dyn LanguageModel>,
    templates: TemplateEngine,
}

struct PreparedSearch {
    prompt: ChatPrompt,
    context: Value,
    json: bool,
}

impl GraphRagEngine {
    pub fn new(model: Arc<dyn LanguageModel>) -> Result<Self, AppError> {
        let templates: Vec<(&'static str, &'static str)> = SEARCH_TEMPLATES
            .iter()
            .chain(TUNE_TEMPLATES)
            .copied()
            .collect();
        Ok(Self {
            model,
            templates: TemplateEngine::from_templates(&templates)?,
        })
    }

    async fn prepare(
        &self,
        config: &AppConfig,
        call: StrategyCall,
    ) -> Result<PreparedSearch, AppError> {
        let kind = call.kind();
        let (response_type, json) = match &call {
            StrategyCall::Local(query)
            | StrategyCall::Global { query, .. }
            | StrategyCall::Drift(query) => {
                (query.response_type.clone(), wants_json(&query.response_type))
            }
            StrategyCall::Basic(_) => (BASIC_RESPONSE_TYPE.to_string(), false),
        };
        let question = call.query_text().to_string();

        let settings = config.search.clone();
        let built = tokio::task::spawn_blocking(move || build_context(&call, &settings)).await??;
        debug!(kind = %kind, chars = built.text.len(), "Context assembled");

        let system = self.templates.render(
            template_for(kind),
            &context! {
                context_data => built.text,
                response_type => response_type,
                json => json,
            },
        )?;

        Ok(PreparedSearch {
            prompt: ChatPrompt::new(system, question).json(json),
            context: built.records,
            json,
        })
    }
}

const fn template_for(kind: SearchKind) -> &'static str {
    match kind {
        SearchKind::Local => LOCAL_SEARCH,
        SearchKind::Global => GLOBAL_SEARCH,
        SearchKind::Drift => DRIFT_SEARCH,
        SearchKind::Basic => BASIC_SEARCH,
    }
}

fn graph_views(query: &GraphQuery) -> Result<Vec<GraphView>, AppError> {
    query.indexes.iter().map(GraphView::from_index).collect()
}

fn build_context(call: &StrategyCall, settings: &SearchSettings) -> Result<BuiltContext, AppError> {
    match call {
        StrategyCall::Local(query) => Ok(build_local_context(&graph_views(query)?, query, settings)),
        StrategyCall::Global {
            query,
            dynamic_community_selection,
        } => Ok(build_global_context(
            &graph_views(query)?,
            query,
            *dynamic_community_selection,
            settings,
        )),
        StrategyCall::Drift(query) => Ok(build_drift_context(&graph_views(query)?, query, settings)),
        StrategyCall::Basic(basic) => build_basic_context(basic, settings),
    }
}

fn empty_answer() -> AppError {
    AppError::LLMParsing("model returned an empty answer".into())
}

/// A JSON-mode answer becomes the parsed object when the model produced
/// one, and stays a string otherwise.
fn parse_answer(answer: &str, json: bool) -> Value {
    if json {
        if let Ok(parsed @ Value::Object(_)) = serde_json::from_str::<Value>(answer) {
            return parsed;
        }
    }
    Value::String(answer.to_string())
}

#[async_trait]
impl GraphEngine for GraphRagEngine {
    #[instrument(skip_all, fields(kind = %call.kind()))]
    async fn search(&self, config: &AppConfig, call: StrategyCall) -> Result<SearchResult, AppError> {
        let prepared = self.prepare(config, call).await?;
        let answer = self.model.complete(config, prepared.prompt).await?;
        if answer.trim().is_empty() {
            return Err(empty_answer());
        }

        Ok(SearchResult {
            response: parse_answer(&answer, prepared.json),
            context: prepared.context,
        })
    }

    #[instrument(skip_all, fields(kind = %call.kind()))]
    async fn search_streaming(
        &self,
        config: &AppConfig,
        call: StrategyCall,
    ) -> Result<FragmentStream, AppError> {
        let prepared = self.prepare(config, call).await?;
        let mut deltas = self.model.complete_streaming(config, prepared.prompt).await?;

        // Deltas are forwarded untouched so the fragments join to the same text
        // `search` returns. A blank answer ends the stream with an error.
        Ok(Box::pin(stream! {
            let mut answered = false;
            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(content) => {
                        answered |= !content.trim().is_empty();
                        yield Ok(Fragment::new(content));
                    }
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }
            if !answered {
                yield Err(empty_answer());
            }
        }))
    }

    async fn build_index(&self, config: &AppConfig) -> Result<(), AppError> {
        IndexCommand::from_config(config)?.run().await?;
        info!(root = %config.dataset_root.display(), "Index ready");
        Ok(())
    }

    async fn generate_indexing_prompts(
        &self,
        config: &AppConfig,
        params: PromptTuneParams,
    ) -> Result<IndexingPrompts, AppError> {
        prompt_tune::generate_indexing_prompts(self.model.as_ref(), &self.templates, config, params)
            .await
    }
}
