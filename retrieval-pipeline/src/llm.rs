use std::pin::Pin;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs,
        ResponseFormat,
    },
    Client,
};
use async_stream::stream;
use async_trait::async_trait;
use common::{error::AppError, utils::config::AppConfig};
use futures::{Stream, StreamExt};
use tracing::debug;

/// Text deltas produced by a streaming completion.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, AppError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
    pub json_mode: bool,
    pub max_tokens: Option<u32>,
}

impl ChatPrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            json_mode: false,
            max_tokens: None,
        }
    }

    #[must_use]
    pub const fn json(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Chat and embedding model used to answer searches and tune prompts.
///
/// Model names are read from the `config` passed per call, so a derived
/// configuration takes effect without rebuilding the client.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, config: &AppConfig, prompt: ChatPrompt) -> Result<String, AppError>;

    async fn complete_streaming(
        &self,
        config: &AppConfig,
        prompt: ChatPrompt,
    ) -> Result<TextStream, AppError>;

    async fn embed(&self, config: &AppConfig, inputs: Vec<String>)
        -> Result<Vec<Vec<f32>>, AppError>;
}

/// [`LanguageModel`] backed by any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiLanguageModel {
    chat: Client<OpenAIConfig>,
    embeddings: Client<OpenAIConfig>,
}

impl OpenAiLanguageModel {
    pub fn from_config(config: &AppConfig) -> Self {
        let chat = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(&config.llm.api_key)
                .with_api_base(&config.llm.api_base),
        );
        // Embedding endpoints fall back to the chat credentials.
        let embedding_key = if config.embeddings.api_key.is_empty() {
            &config.llm.api_key
        } else {
            &config.embeddings.api_key
        };
        let embeddings = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(embedding_key)
                .with_api_base(&config.embeddings.api_base),
        );

        Self { chat, embeddings }
    }
}

pub fn create_chat_request(
    config: &AppConfig,
    prompt: ChatPrompt,
) -> Result<CreateChatCompletionRequest, OpenAIError> {
    let mut args = CreateChatCompletionRequestArgs::default();
    args.model(&config.llm.model)
        .messages([
            ChatCompletionRequestSystemMessage::from(prompt.system).into(),
            ChatCompletionRequestUserMessage::from(prompt.user).into(),
        ])
        .temperature(config.llm.temperature);

    if let Some(max_tokens) = prompt.max_tokens.or(config.llm.max_tokens) {
        args.max_completion_tokens(max_tokens);
    }
    if prompt.json_mode {
        args.response_format(ResponseFormat::JsonObject);
    }

    args.build()
}

#[async_trait]
impl LanguageModel for OpenAiLanguageModel {
    async fn complete(&self, config: &AppConfig, prompt: ChatPrompt) -> Result<String, AppError> {
        let request = create_chat_request(config, prompt)?;
        let response = self.chat.chat().create(request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::LLMParsing("No content found in LLM response".into()))?;

        debug!(chars = content.len(), "Completion received");
        Ok(content)
    }

    async fn complete_streaming(
        &self,
        config: &AppConfig,
        prompt: ChatPrompt,
    ) -> Result<TextStream, AppError> {
        let request = create_chat_request(config, prompt)?;
        let mut upstream = self.chat.chat().create_stream(request).await?;

        let deltas = stream! {
            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(response) => {
                        let content: String = response
                            .choices
                            .into_iter()
                            .filter_map(|choice| choice.delta.content)
                            .collect();
                        if !content.is_empty() {
                            yield Ok(content);
                        }
                    }
                    Err(err) => {
                        yield Err(AppError::from(err));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(deltas))
    }

    async fn embed(
        &self,
        config: &AppConfig,
        inputs: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, AppError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&config.embeddings.model)
            .input(inputs)
            .build()?;

        let mut data = self.embeddings.embeddings().create(request).await?.data;
        data.sort_by_key(|item| item.index);

        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::config::test_config;
    use std::path::Path;

    #[test]
    fn chat_request_uses_config_model_and_json_mode() {
        let mut config = test_config(Path::new("/data"));
        config.llm.model = "graph-chat".into();
        config.llm.max_tokens = Some(512);

        let request =
            create_chat_request(&config, ChatPrompt::new("system", "user").json(true)).unwrap();

        assert_eq!(request.model, "graph-chat");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.max_completion_tokens, Some(512));
        assert!(matches!(
            request.response_format,
            Some(ResponseFormat::JsonObject)
        ));
    }

    #[test]
    fn prompt_token_limit_wins_over_config() {
        let mut config = test_config(Path::new("/data"));
        config.llm.max_tokens = Some(512);

        let request =
            create_chat_request(&config, ChatPrompt::new("s", "u").max_tokens(64)).unwrap();

        assert_eq!(request.max_completion_tokens, Some(64));
        assert!(request.response_format.is_none());
    }
}
