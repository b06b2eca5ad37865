use std::sync::Arc;

use super::anthropic::AnthropicProvider;
use super::google::GoogleProvider;
use super::openai::OpenAiProvider;
use super::provider::LlmProvider;
use crate::core::config::{LlmSettings, ProviderKind};
use crate::core::errors::ApiError;

fn missing_key(kind: ProviderKind) -> ApiError {
    ApiError::Configuration(format!(
        "Missing API key for {}. Please set {} in your environment variables.",
        kind,
        kind.credential_env()
    ))
}

pub fn create_chat_provider(settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, ApiError> {
    let kind = settings.provider;
    let endpoint = settings.endpoint(kind);
    let api_key = endpoint.api_key.clone().ok_or_else(|| missing_key(kind))?;

    let provider: Arc<dyn LlmProvider> = match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            &endpoint.base_url,
            api_key,
            settings.request_timeout,
        )?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            &endpoint.base_url,
            api_key,
            settings.max_tokens,
            settings.request_timeout,
        )?),
        ProviderKind::Google => Arc::new(GoogleProvider::new(
            &endpoint.base_url,
            api_key,
            settings.request_timeout,
        )?),
    };
    Ok(provider)
}

/// Embedding backend for the configured provider. Anthropic has none, so it
/// borrows OpenAI when an OpenAI key is available and otherwise returns
/// `None`; the service then fails embedding calls with a configuration error.
pub fn create_embedding_provider(
    settings: &LlmSettings,
    chat: &Arc<dyn LlmProvider>,
) -> Result<Option<Arc<dyn LlmProvider>>, ApiError> {
    if settings.provider.has_native_embeddings() {
        return Ok(Some(chat.clone()));
    }

    match settings.openai.api_key.clone() {
        Some(api_key) => {
            tracing::warn!(
                "{} has no embeddings API; falling back to OpenAI embeddings ({})",
                settings.provider.display_name(),
                settings.embedding_model
            );
            Ok(Some(Arc::new(OpenAiProvider::new(
                &settings.openai.base_url,
                api_key,
                settings.request_timeout,
            )?)))
        }
        None => {
            tracing::warn!(
                "{} has no embeddings API and OPENAI_API_KEY is not set; search is unavailable",
                settings.provider.display_name()
            );
            Ok(None)
        }
    }
}
