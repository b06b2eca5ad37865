use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use super::context::{build_context, build_messages};
use super::index::{DocsIndex, QueryResult};
use super::stream::{AnswerMetadata, AnswerStreamWriter, Source, StreamEvent};
use crate::core::config::RagSettings;
use crate::core::errors::ApiError;
use crate::llm::{ChatRequest, LlmService};

pub const MAX_QUESTION_CHARS: usize = 4_000;
const EVENT_BUFFER: usize = 32;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub chunk_count: usize,
}

/// Retrieved material for one question, ready for the completion call.
struct Retrieval {
    request: ChatRequest,
    metadata: AnswerMetadata,
}

pub fn validate_question(question: &str) -> Result<&str, ApiError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("Question is required".to_string()));
    }
    if trimmed.chars().count() > MAX_QUESTION_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Question is too long (max {} characters)",
            MAX_QUESTION_CHARS
        )));
    }
    Ok(trimmed)
}

fn sources_of(results: &[QueryResult]) -> Vec<Source> {
    results
        .iter()
        .map(|r| Source {
            id: r.chunk.id.clone(),
            path: r.chunk.path.clone(),
            score: r.score,
        })
        .collect()
}

#[derive(Clone)]
pub struct RagPipeline {
    index: Arc<DocsIndex>,
    llm: LlmService,
    settings: RagSettings,
}

impl RagPipeline {
    pub fn new(index: Arc<DocsIndex>, llm: LlmService, settings: RagSettings) -> Self {
        Self {
            index,
            llm,
            settings,
        }
    }

    async fn retrieve(&self, question: &str, refresh: bool) -> Result<Retrieval, ApiError> {
        let question = validate_question(question)?;

        self.index.ensure(refresh).await?;
        let vector = self.llm.embed_query(question).await?;
        let results = self.index.search(&vector, self.settings.top_k);
        let context = build_context(&results, self.settings.max_context_chars);

        tracing::debug!(
            "Retrieved {} chunks ({} context chars) for question",
            results.len(),
            context.chars().count()
        );

        Ok(Retrieval {
            request: ChatRequest::new(build_messages(question, &context)),
            metadata: AnswerMetadata {
                sources: sources_of(&results),
                chunk_count: self.index.status().chunk_count,
            },
        })
    }

    pub async fn answer(&self, question: &str, refresh: bool) -> Result<RagAnswer, ApiError> {
        let Retrieval { request, metadata } = self.retrieve(question, refresh).await?;
        let answer = self.llm.complete(request).await?;

        Ok(RagAnswer {
            answer,
            sources: metadata.sources,
            chunk_count: metadata.chunk_count,
        })
    }

    /// Failures before the stream opens come back as `Err`; later ones
    /// arrive as the terminal error event.
    pub async fn answer_stream(
        &self,
        question: &str,
        refresh: bool,
    ) -> Result<mpsc::Receiver<StreamEvent>, ApiError> {
        let Retrieval { request, metadata } = self.retrieve(question, refresh).await?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let llm = self.llm.clone();

        tokio::spawn(async move {
            let mut writer = AnswerStreamWriter::new(tx);
            if writer.metadata(metadata).await.is_err() {
                return;
            }

            let mut tokens = match llm.stream_complete(request).await {
                Ok(tokens) => tokens,
                Err(err) => {
                    tracing::warn!("Completion stream failed to start: {}", err);
                    let _ = writer.error(err.public_message()).await;
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = writer.closed() => {
                        tracing::debug!("Answer stream consumer disconnected");
                        return;
                    }
                    item = tokens.recv() => match item {
                        Some(Ok(delta)) => {
                            if writer.content(delta).await.is_err() {
                                return;
                            }
                        }
                        Some(Err(err)) => {
                            tracing::warn!("Completion stream failed: {}", err);
                            let _ = writer.error(err.public_message()).await;
                            return;
                        }
                        None => {
                            let _ = writer.done().await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
