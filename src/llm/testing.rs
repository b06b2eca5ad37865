//! Deterministic in-process provider used by tests across the crate.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::provider::{LlmProvider, TokenStream};
use super::service::{LlmService, ModelOptions};
use super::types::ChatRequest;
use crate::core::errors::ApiError;

pub const DIMENSIONS: usize = 16;

/// Bag-of-words embedding: each lowercase word bumps one hashed bucket.
pub fn hashed_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSIONS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % DIMENSIONS as u64) as usize] += 1.0;
    }
    vector
}

pub struct ScriptedProvider {
    deltas: Vec<String>,
    embed_delay: Duration,
    fail_embeddings: AtomicBool,
    fail_chat: Option<String>,
    fail_after_deltas: Option<String>,
    embed_calls: AtomicUsize,
    last_request: Mutex<Option<ChatRequest>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self {
            deltas: vec!["Hello".to_string(), " world".to_string()],
            embed_delay: Duration::ZERO,
            fail_embeddings: AtomicBool::new(false),
            fail_chat: None,
            fail_after_deltas: None,
            embed_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deltas(mut self, deltas: &[&str]) -> Self {
        self.deltas = deltas.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_embed_delay(mut self, delay: Duration) -> Self {
        self.embed_delay = delay;
        self
    }

    pub fn failing_chat(mut self, message: &str) -> Self {
        self.fail_chat = Some(message.to_string());
        self
    }

    pub fn failing_mid_stream(mut self, message: &str) -> Self {
        self.fail_after_deltas = Some(message.to_string());
        self
    }

    pub fn set_embeddings_failing(&self, failing: bool) {
        self.fail_embeddings.store(failing, Ordering::SeqCst);
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }

    fn record(&self, request: &ChatRequest) -> Result<(), ApiError> {
        if let Ok(mut slot) = self.last_request.lock() {
            *slot = Some(request.clone());
        }
        match &self.fail_chat {
            Some(message) => Err(ApiError::provider("scripted", Some(503), message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
        self.record(&request)?;
        Ok(self.deltas.concat())
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        _model_id: &str,
    ) -> Result<TokenStream, ApiError> {
        self.record(&request)?;
        let (tx, rx) = mpsc::channel(8);
        let deltas = self.deltas.clone();
        let failure = self.fail_after_deltas.clone();
        tokio::spawn(async move {
            for delta in deltas {
                if tx.send(Ok(delta)).await.is_err() {
                    return;
                }
            }
            if let Some(message) = failure {
                let _ = tx
                    .send(Err(ApiError::provider("scripted", None, message)))
                    .await;
            }
        });
        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if !self.embed_delay.is_zero() {
            tokio::time::sleep(self.embed_delay).await;
        }
        if self.fail_embeddings.load(Ordering::SeqCst) {
            return Err(ApiError::provider("scripted", Some(500), "embedding backend down"));
        }
        Ok(inputs.iter().map(|text| hashed_embedding(text)).collect())
    }
}

pub fn options() -> ModelOptions {
    ModelOptions {
        chat_model: "scripted-chat".to_string(),
        embedding_model: "scripted-embed".to_string(),
        temperature: 0.0,
        max_tokens: 256,
    }
}

pub fn service(provider: Arc<ScriptedProvider>) -> LlmService {
    let chat: Arc<dyn LlmProvider> = provider;
    LlmService::new(chat.clone(), Some(chat), options())
}
