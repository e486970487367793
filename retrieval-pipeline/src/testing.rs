//! Test doubles for the model and engine seams.

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use async_trait::async_trait;
use common::{error::AppError, utils::config::AppConfig};
use futures::{stream, StreamExt};
use serde_json::json;
use tokio::sync::Notify;

pub use common::utils::config::test_config;

use crate::{
    engine::{FragmentStream, GraphEngine, StrategyCall},
    llm::{ChatPrompt, LanguageModel, TextStream},
    prompt_tune::{IndexingPrompts, PromptTuneParams},
    search::{Fragment, SearchResult},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Splits text into word-sized pieces that concatenate back to the input.
pub fn split_into_fragments(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

/// A [`LanguageModel`] that replays queued replies, then a fixed fallback.
/// Embeddings are normalized letter histograms.
#[derive(Debug)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<ChatPrompt>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new("The answer is grounded in the context.")
    }
}

impl ScriptedModel {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_replies<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.replies).extend(replies.into_iter().map(Into::into));
        self
    }

    pub fn prompts(&self) -> Vec<ChatPrompt> {
        lock(&self.prompts).clone()
    }

    fn reply(&self, prompt: ChatPrompt) -> String {
        lock(&self.prompts).push(prompt);
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, _config: &AppConfig, prompt: ChatPrompt) -> Result<String, AppError> {
        Ok(self.reply(prompt))
    }

    async fn complete_streaming(
        &self,
        _config: &AppConfig,
        prompt: ChatPrompt,
    ) -> Result<TextStream, AppError> {
        let pieces = split_into_fragments(&self.reply(prompt));
        Ok(Box::pin(stream::iter(pieces.into_iter().map(Ok))))
    }

    async fn embed(
        &self,
        _config: &AppConfig,
        inputs: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, AppError> {
        Ok(inputs.iter().map(|input| letter_histogram(input)).collect())
    }
}

fn letter_histogram(text: &str) -> Vec<f32> {
    let mut counts = vec![0.0_f32; 26];
    for byte in text.bytes().filter(u8::is_ascii_alphabetic) {
        let slot = usize::from(byte.to_ascii_lowercase() - b'a');
        if let Some(count) = counts.get_mut(slot) {
            *count += 1.0;
        }
    }
    let norm = counts.iter().map(|c| c * c).sum::<f32>().sqrt();
    if norm > 0.0 {
        counts.iter_mut().for_each(|c| *c /= norm);
    }
    counts
}

/// Blocks [`RecordingEngine::build_index`] until released.
#[derive(Debug, Clone, Default)]
pub struct BuildGate {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl BuildGate {
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Observes how far a [`RecordingEngine`] fragment stream was polled and
/// whether it has been dropped.
#[derive(Debug, Default)]
pub struct StreamTracker {
    produced: AtomicUsize,
    dropped: AtomicBool,
}

impl StreamTracker {
    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// Marks the tracker when the owning stream is dropped.
struct DropSignal(Arc<StreamTracker>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        self.0.dropped.store(true, Ordering::SeqCst);
    }
}

/// A [`GraphEngine`] that records every call and answers from the call's
/// own arguments.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<StrategyCall>>,
    built_roots: Mutex<Vec<PathBuf>>,
    tuned: Mutex<Vec<PromptTuneParams>>,
    failure: Option<String>,
    fragments: Option<Vec<String>>,
    fail_stream_after: Option<usize>,
    build_gate: Option<BuildGate>,
    stream_tracker: Option<Arc<StreamTracker>>,
}

impl RecordingEngine {
    /// Every operation fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: Some(fragments.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// The stream yields `count` fragments, then an error, then ends.
    #[must_use]
    pub const fn fail_stream_after(mut self, count: usize) -> Self {
        self.fail_stream_after = Some(count);
        self
    }

    #[must_use]
    pub fn with_build_gate(mut self, gate: BuildGate) -> Self {
        self.build_gate = Some(gate);
        self
    }

    #[must_use]
    pub fn with_stream_tracker(mut self, tracker: Arc<StreamTracker>) -> Self {
        self.stream_tracker = Some(tracker);
        self
    }

    pub fn calls(&self) -> Vec<StrategyCall> {
        lock(&self.calls).clone()
    }

    pub fn built_roots(&self) -> Vec<PathBuf> {
        lock(&self.built_roots).clone()
    }

    pub fn tuned(&self) -> Vec<PromptTuneParams> {
        lock(&self.tuned).clone()
    }

    fn check(&self) -> Result<(), AppError> {
        match &self.failure {
            Some(message) => Err(AppError::InternalError(message.clone())),
            None => Ok(()),
        }
    }

    fn record(&self, call: &StrategyCall) {
        lock(&self.calls).push(call.clone());
    }

    /// Deterministic answer text for `call`.
    pub fn answer(call: &StrategyCall) -> String {
        format!("{} answer for {}", call.kind(), call.query_text())
    }

    fn index_names(call: &StrategyCall) -> Vec<String> {
        match call {
            StrategyCall::Local(query)
            | StrategyCall::Global { query, .. }
            | StrategyCall::Drift(query) => {
                query.indexes.iter().map(|index| index.name.clone()).collect()
            }
            StrategyCall::Basic(basic) => {
                basic.text_units.iter().map(|table| table.name.clone()).collect()
            }
        }
    }
}

#[async_trait]
impl GraphEngine for RecordingEngine {
    async fn search(&self, _config: &AppConfig, call: StrategyCall) -> Result<SearchResult, AppError> {
        self.record(&call);
        self.check()?;
        Ok(SearchResult {
            response: json!(Self::answer(&call)),
            context: json!({ "indexes": Self::index_names(&call) }),
        })
    }

    async fn search_streaming(
        &self,
        _config: &AppConfig,
        call: StrategyCall,
    ) -> Result<FragmentStream, AppError> {
        self.record(&call);
        self.check()?;

        let fragments = self
            .fragments
            .clone()
            .unwrap_or_else(|| split_into_fragments(&Self::answer(&call)));
        let mut items: Vec<Result<Fragment, AppError>> = fragments
            .into_iter()
            .map(|content| Ok(Fragment::new(content)))
            .collect();
        if let Some(count) = self.fail_stream_after {
            items.truncate(count);
            items.push(Err(AppError::InternalError("stream interrupted".into())));
        }
        let fragments = stream::iter(items);
        match &self.stream_tracker {
            Some(tracker) => {
                let signal = DropSignal(Arc::clone(tracker));
                Ok(Box::pin(fragments.map(move |item| {
                    signal.0.produced.fetch_add(1, Ordering::SeqCst);
                    item
                })))
            }
            None => Ok(Box::pin(fragments)),
        }
    }

    async fn build_index(&self, config: &AppConfig) -> Result<(), AppError> {
        lock(&self.built_roots).push(config.dataset_root.clone());
        if let Some(gate) = &self.build_gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        match &self.failure {
            Some(message) => Err(AppError::Indexing(message.clone())),
            None => Ok(()),
        }
    }

    async fn generate_indexing_prompts(
        &self,
        _config: &AppConfig,
        params: PromptTuneParams,
    ) -> Result<IndexingPrompts, AppError> {
        params.validate()?;
        lock(&self.tuned).push(params.clone());
        self.check()?;
        let root = params.root.display().to_string();
        Ok(IndexingPrompts {
            entity_extraction: format!("extract entities from {root}"),
            entity_summarization: format!("summarize entities from {root}"),
            community_summarization: format!("summarize communities from {root}"),
        })
    }
}
