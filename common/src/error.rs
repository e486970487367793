use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

use crate::storage::dataset::DatasetLoadError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    DatasetLoad(#[from] DatasetLoadError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("{kind} search failed: {cause}")]
    Retrieval { kind: String, cause: String },
    #[error("Index build failed: {0}")]
    Indexing(String),
    #[error("Prompt generation failed: {0}")]
    PromptTuning(String),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("Record parsing error: {0}")]
    Record(#[from] serde_json::Error),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Wraps a failure raised by a retrieval strategy. Errors that already
    /// carry a strategy label, and dataset failures, are passed through.
    pub fn retrieval(kind: impl std::fmt::Display, err: AppError) -> Self {
        match err {
            err @ (Self::Retrieval { .. } | Self::DatasetLoad(_)) => err,
            other => Self::Retrieval {
                kind: kind.to_string(),
                cause: other.to_string(),
            },
        }
    }

    /// Labels a failed index build with its cause. Validation failures stay
    /// client errors.
    pub fn indexing(err: AppError) -> Self {
        match err {
            err @ (Self::Indexing(_) | Self::Validation(_)) => err,
            other => Self::Indexing(other.to_string()),
        }
    }

    /// Labels a failed prompt generation with its cause. Validation failures
    /// stay client errors.
    pub fn prompt_tuning(err: AppError) -> Self {
        match err {
            err @ (Self::PromptTuning(_) | Self::Validation(_)) => err,
            other => Self::PromptTuning(other.to_string()),
        }
    }
}
