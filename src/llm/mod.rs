pub mod anthropic;
pub mod factory;
pub mod google;
pub mod openai;
pub mod provider;
pub mod service;
pub mod sse;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use reqwest::Client;

use crate::core::errors::ApiError;

pub use provider::{LlmProvider, TokenStream};
pub use service::{LlmService, ModelOptions};
pub use types::{ChatMessage, ChatRequest};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared client settings. Only the connect phase is bounded here; whole
/// request timeouts are set per call so long streams are not cut off.
pub(crate) fn http_client() -> Result<Client, ApiError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(ApiError::internal)
}
