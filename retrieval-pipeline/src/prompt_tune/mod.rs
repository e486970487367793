//! Generates corpus-specific indexing prompts from a sample of the input
//! documents.

mod selection;
pub mod templates;

pub use selection::select_chunks;

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use common::{
    error::AppError,
    utils::{
        config::AppConfig,
        template_engine::{context, TemplateEngine, Value},
    },
};
use serde::{Deserialize, Serialize};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::{debug, info, instrument};

use crate::llm::{ChatPrompt, LanguageModel};
use templates::{
    COMMUNITY_SUMMARIZATION, COMPLETION_DELIMITER, DOMAIN, ENTITY_EXTRACTION,
    ENTITY_SUMMARIZATION, ENTITY_TYPES, EXAMPLE, LANGUAGE, PERSONA, RECORD_DELIMITER,
    REPORTER_ROLE, TUNER_SYSTEM_PROMPT, TUPLE_DELIMITER,
};

pub const DEFAULT_ENTITY_TYPES: [&str; 4] = ["organization", "person", "geo", "event"];
const INPUT_EXTENSIONS: [&str; 3] = ["txt", "md", "csv"];
/// Characters of sample text shown to the model when asking about the corpus.
const SAMPLE_CHARS: usize = 8_000;

/// How chunks are picked from the corpus before prompting the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocSelectionType {
    All,
    #[default]
    Random,
    Top,
    Auto,
}

impl DocSelectionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Random => "RANDOM",
            Self::Top => "TOP",
            Self::Auto => "AUTO",
        }
    }
}

impl FromStr for DocSelectionType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "RANDOM" => Ok(Self::Random),
            "TOP" => Ok(Self::Top),
            "AUTO" => Ok(Self::Auto),
            _ => Err(format!(
                "unknown selection method '{value}', expected one of ALL, RANDOM, TOP, AUTO"
            )),
        }
    }
}

impl fmt::Display for DocSelectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTuneParams {
    pub root: PathBuf,
    pub chunk_size: usize,
    pub overlap: usize,
    pub limit: usize,
    pub selection_method: DocSelectionType,
    pub domain: Option<String>,
    pub language: Option<String>,
    pub max_tokens: usize,
    pub discover_entity_types: bool,
    pub min_examples_required: usize,
    pub n_subset_max: usize,
    pub k: usize,
}

impl PromptTuneParams {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: 1200,
            overlap: 100,
            limit: 15,
            selection_method: DocSelectionType::default(),
            domain: None,
            language: None,
            max_tokens: 2048,
            discover_entity_types: true,
            min_examples_required: 2,
            n_subset_max: 300,
            k: 15,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunk_size == 0 {
            return Err(AppError::Validation("chunk_size must be at least 1".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(AppError::Validation(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        if self.max_tokens == 0 {
            return Err(AppError::Validation("max_tokens must be at least 1".into()));
        }
        match self.selection_method {
            DocSelectionType::Random | DocSelectionType::Top if self.limit == 0 => Err(
                AppError::Validation("limit must be at least 1".into()),
            ),
            DocSelectionType::Auto if self.k == 0 || self.n_subset_max == 0 => Err(
                AppError::Validation("k and n_subset_max must be at least 1".into()),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingPrompts {
    pub entity_extraction: String,
    pub entity_summarization: String,
    pub community_summarization: String,
}

#[derive(Debug, Clone, Serialize)]
struct Example {
    text: String,
    output: String,
}

/// Asks `model` about the corpus under `params.root` and renders the three
/// indexing prompts from the answers.
#[instrument(skip_all, fields(root = %params.root.display(), method = %params.selection_method))]
pub async fn generate_indexing_prompts(
    model: &dyn LanguageModel,
    templates: &TemplateEngine,
    config: &AppConfig,
    params: PromptTuneParams,
) -> Result<IndexingPrompts, AppError> {
    params.validate()?;

    let documents = load_documents(&params.root).await?;
    let chunks = chunk_documents(&documents, params.chunk_size, params.overlap)?;
    if chunks.is_empty() {
        return Err(AppError::Validation(format!(
            "no input text found under {}",
            params.root.display()
        )));
    }
    let total = chunks.len();
    let selected = select_chunks(model, config, chunks, &params).await?;
    info!(total, selected = selected.len(), "Selected chunks for prompt tuning");

    let tuner = Tuner {
        model,
        templates,
        config,
    };
    let sample = truncate_chars(&selected.join("\n\n"), SAMPLE_CHARS);

    let domain = match given(params.domain.as_deref()) {
        Some(domain) => domain,
        None => tuner.ask(DOMAIN, context! { documents => sample }).await?,
    };
    let language = match given(params.language.as_deref()) {
        Some(language) => language,
        None => tuner.ask(LANGUAGE, context! { documents => sample }).await?,
    };
    let persona = tuner.ask(PERSONA, context! { domain => domain }).await?;

    let mut entity_types = Vec::new();
    if params.discover_entity_types {
        let reply = tuner
            .ask(
                ENTITY_TYPES,
                context! { domain => domain, persona => persona, documents => sample },
            )
            .await?;
        entity_types = parse_entity_types(&reply);
    }
    if entity_types.is_empty() {
        entity_types = DEFAULT_ENTITY_TYPES.iter().map(|t| (*t).to_string()).collect();
    }
    debug!(?entity_types, %domain, %language, "Corpus profile ready");

    let examples = tuner
        .examples(&selected, &entity_types, &persona, &language, &params)
        .await?;
    let reporter_role = tuner
        .ask(
            REPORTER_ROLE,
            context! { domain => domain, persona => persona, documents => sample },
        )
        .await?;

    Ok(IndexingPrompts {
        entity_extraction: templates.render(
            ENTITY_EXTRACTION,
            &context! { entity_types => entity_types, language => language, examples => examples },
        )?,
        entity_summarization: templates.render(
            ENTITY_SUMMARIZATION,
            &context! { persona => persona, language => language },
        )?,
        community_summarization: templates.render(
            COMMUNITY_SUMMARIZATION,
            &context! { reporter_role => reporter_role, language => language },
        )?,
    })
}

struct Tuner<'a> {
    model: &'a dyn LanguageModel,
    templates: &'a TemplateEngine,
    config: &'a AppConfig,
}

impl Tuner<'_> {
    async fn ask(&self, template: &str, ctx: Value) -> Result<String, AppError> {
        let user = self.templates.render(template, &ctx)?;
        let reply = self
            .model
            .complete(self.config, ChatPrompt::new(TUNER_SYSTEM_PROMPT, user))
            .await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(AppError::LLMParsing(format!("empty reply for {template}")));
        }
        Ok(reply.to_string())
    }

    /// Extraction examples from the selected chunks. The first
    /// `min_examples_required` are always kept; later ones only while the
    /// estimated size stays within `max_tokens`.
    async fn examples(
        &self,
        chunks: &[String],
        entity_types: &[String],
        persona: &str,
        language: &str,
        params: &PromptTuneParams,
    ) -> Result<Vec<Example>, AppError> {
        let mut examples = Vec::new();
        let mut used_tokens = 0_usize;

        for chunk in chunks {
            let output = self
                .ask(
                    EXAMPLE,
                    context! {
                        persona => persona,
                        entity_types => entity_types,
                        language => language,
                        text => chunk,
                        tuple_delimiter => TUPLE_DELIMITER,
                        record_delimiter => RECORD_DELIMITER,
                        completion_delimiter => COMPLETION_DELIMITER,
                    },
                )
                .await?;
            let tokens = estimate_tokens(chunk).saturating_add(estimate_tokens(&output));
            let over_budget = used_tokens.saturating_add(tokens) > params.max_tokens;
            if examples.len() >= params.min_examples_required && over_budget {
                break;
            }
            used_tokens = used_tokens.saturating_add(tokens);
            examples.push(Example {
                text: chunk.clone(),
                output,
            });
        }

        debug!(count = examples.len(), used_tokens, "Generated extraction examples");
        Ok(examples)
    }
}

fn given(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Rough token count, four characters per token.
fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Splits a comma or newline separated list, dropping bullets, quotes and
/// duplicates.
fn parse_entity_types(reply: &str) -> Vec<String> {
    let mut types: Vec<String> = Vec::new();
    for raw in reply.split([',', '\n']) {
        let cleaned = raw
            .trim()
            .trim_start_matches(['-', '*'])
            .trim()
            .trim_matches(['"', '\'', '[', ']', '.'])
            .trim()
            .to_lowercase();
        if !cleaned.is_empty() && !types.contains(&cleaned) {
            types.push(cleaned);
        }
    }
    types
}

async fn load_documents(root: &Path) -> Result<Vec<String>, AppError> {
    let input = root.join("input");
    let dir = if input.is_dir() {
        input
    } else if root.is_dir() {
        root.to_path_buf()
    } else {
        return Err(AppError::Validation(format!(
            "root {} is not a directory",
            root.display()
        )));
    };

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                INPUT_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            });
        if supported && entry.file_type().await?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(&path).await?;
        let text = String::from_utf8_lossy(&bytes).trim().to_string();
        if !text.is_empty() {
            documents.push(text);
        }
    }
    debug!(dir = %dir.display(), documents = documents.len(), "Loaded tuning input");
    Ok(documents)
}

fn chunk_documents(
    documents: &[String],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, AppError> {
    let chunk_config = ChunkConfig::new(chunk_size)
        .with_overlap(overlap)
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let splitter = TextSplitter::new(chunk_config);

    let mut chunks = Vec::new();
    for document in documents {
        chunks.extend(splitter.chunks(document).map(str::to_string));
    }
    Ok(chunks)
}
