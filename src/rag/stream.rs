//! Event protocol for streamed answers.
//!
//! One metadata event, then content deltas in provider order, then exactly
//! one terminal event. [`AnswerStreamWriter`] refuses anything else.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub id: String,
    pub path: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerMetadata {
    pub sources: Vec<Source>,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamEvent {
    Metadata(AnswerMetadata),
    Content(String),
    Done,
    Error(String),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Metadata(_) => "metadata",
            StreamEvent::Content(_) => "content",
            StreamEvent::Done => "done",
            StreamEvent::Error(_) => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    MetadataSent,
    Streaming,
    Done,
    Errored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream consumer disconnected")]
    Closed,
    #[error("cannot emit {event} event in state {state:?}")]
    InvalidTransition {
        state: StreamState,
        event: &'static str,
    },
}

pub struct AnswerStreamWriter {
    state: StreamState,
    tx: mpsc::Sender<StreamEvent>,
}

impl AnswerStreamWriter {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            state: StreamState::Idle,
            tx,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Resolves once the consumer has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    fn next_state(&self, event: &StreamEvent) -> Result<StreamState, StreamError> {
        use StreamState::*;
        let next = match (self.state, event) {
            (Idle, StreamEvent::Metadata(_)) => MetadataSent,
            (MetadataSent | Streaming, StreamEvent::Content(_)) => Streaming,
            (MetadataSent | Streaming, StreamEvent::Done) => Done,
            (Idle | MetadataSent | Streaming, StreamEvent::Error(_)) => Errored,
            (state, event) => {
                return Err(StreamError::InvalidTransition {
                    state,
                    event: event.kind(),
                })
            }
        };
        Ok(next)
    }

    async fn emit(&mut self, event: StreamEvent) -> Result<(), StreamError> {
        let next = self.next_state(&event)?;
        let terminal = event.is_terminal();
        let sent = self.tx.send(event).await;
        // a terminal transition stands even if nobody is listening any more
        if sent.is_ok() || terminal {
            self.state = next;
        }
        sent.map_err(|_| StreamError::Closed)
    }

    pub async fn metadata(&mut self, metadata: AnswerMetadata) -> Result<(), StreamError> {
        self.emit(StreamEvent::Metadata(metadata)).await
    }

    /// Empty deltas are dropped without changing state.
    pub async fn content(&mut self, delta: String) -> Result<(), StreamError> {
        if delta.is_empty() {
            self.next_state(&StreamEvent::Content(String::new()))?;
            return Ok(());
        }
        self.emit(StreamEvent::Content(delta)).await
    }

    pub async fn done(&mut self) -> Result<(), StreamError> {
        self.emit(StreamEvent::Done).await
    }

    pub async fn error(&mut self, message: impl Into<String>) -> Result<(), StreamError> {
        self.emit(StreamEvent::Error(message.into())).await
    }
}
