use std::sync::Arc;

use super::factory;
use super::provider::{LlmProvider, TokenStream};
use super::types::ChatRequest;
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;

/// Sampling and model choices applied to every call.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelOptions {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            chat_model: settings.chat_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

#[derive(Clone)]
pub struct LlmService {
    chat_provider: Arc<dyn LlmProvider>,
    embedding_provider: Option<Arc<dyn LlmProvider>>,
    options: ModelOptions,
}

impl LlmService {
    pub fn new(
        chat_provider: Arc<dyn LlmProvider>,
        embedding_provider: Option<Arc<dyn LlmProvider>>,
        options: ModelOptions,
    ) -> Self {
        Self {
            chat_provider,
            embedding_provider,
            options,
        }
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Self, ApiError> {
        let chat = factory::create_chat_provider(settings)?;
        let embeddings = factory::create_embedding_provider(settings, &chat)?;
        Ok(Self::new(chat, embeddings, ModelOptions::from_settings(settings)))
    }

    pub fn chat_provider_name(&self) -> &str {
        self.chat_provider.name()
    }

    pub fn embeddings_available(&self) -> bool {
        self.embedding_provider.is_some()
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    fn apply_options(&self, request: ChatRequest) -> ChatRequest {
        let temperature = request.temperature.unwrap_or(self.options.temperature);
        let max_tokens = request.max_tokens.unwrap_or(self.options.max_tokens);
        request
            .with_temperature(temperature)
            .with_max_tokens(max_tokens)
    }

    pub async fn complete(&self, request: ChatRequest) -> Result<String, ApiError> {
        let request = self.apply_options(request);
        self.chat_provider
            .chat(request, &self.options.chat_model)
            .await
    }

    pub async fn stream_complete(&self, request: ChatRequest) -> Result<TokenStream, ApiError> {
        let request = self.apply_options(request);
        self.chat_provider
            .stream_chat(request, &self.options.chat_model)
            .await
    }

    fn embedder(&self) -> Result<&Arc<dyn LlmProvider>, ApiError> {
        self.embedding_provider.as_ref().ok_or_else(|| {
            ApiError::Configuration(format!(
                "{} has no embeddings API. Please set OPENAI_API_KEY to use OpenAI embeddings.",
                self.chat_provider.name()
            ))
        })
    }

    /// Embeds every input or fails; a short or long vector list is an error.
    pub async fn embed_documents(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let embedder = self.embedder()?;
        let vectors = embedder
            .embed(inputs, &self.options.embedding_model)
            .await?;
        if vectors.len() != inputs.len() {
            return Err(ApiError::provider(
                embedder.name(),
                None,
                format!(
                    "expected {} embeddings, received {}",
                    inputs.len(),
                    vectors.len()
                ),
            ));
        }
        Ok(vectors)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ApiError::Internal("embedding provider returned nothing".to_string()))
    }
}
