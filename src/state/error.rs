use thiserror::Error;

use crate::core::errors::ApiError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] ApiError),

    #[error("Failed to initialize LLM service: {0}")]
    Llm(#[source] ApiError),

    #[error("Failed to compile content patterns: {0}")]
    Extractor(#[source] regex::Error),

    #[error("Invalid index settings: {0}")]
    Index(#[source] ApiError),

    #[error("Failed to register docs tools: {0}")]
    Tools(#[source] ApiError),
}
