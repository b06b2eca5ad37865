//! In-memory semantic index over the documentation corpus.
//!
//! The published snapshot is immutable and swapped whole, so readers see
//! either the previous complete index or the next one. Builds are
//! single-flight: callers that arrive while a build runs wait for it and
//! receive its outcome.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::catalog::page_uri;
use super::chunker::ChunkerConfig;
use super::extractor::ContentExtractor;
use super::ranker::{LinearCosineRanker, SimilarityRanker};
use super::scanner::CorpusProvider;
use crate::core::errors::ApiError;
use crate::llm::LlmService;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub path: String,
    pub uri: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub chunk: Chunk,
    pub score: f64,
}

#[derive(Debug, Default)]
pub struct IndexSnapshot {
    pub ready: bool,
    pub chunks: Vec<IndexedChunk>,
    pub built_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub ready: bool,
    pub building: bool,
    pub chunk_count: usize,
    pub built_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct BuildLedger {
    finished: u64,
    last_error: Option<ApiError>,
}

/// Clears the building flag on every exit path.
struct BuildingGuard<'a>(&'a AtomicBool);

impl<'a> BuildingGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct DocsIndex {
    corpus: Arc<dyn CorpusProvider>,
    extractor: Arc<ContentExtractor>,
    chunker: ChunkerConfig,
    llm: LlmService,
    ranker: Box<dyn SimilarityRanker>,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    building: AtomicBool,
    generation: AtomicU64,
    build_lock: Mutex<BuildLedger>,
}

impl DocsIndex {
    pub fn new(
        corpus: Arc<dyn CorpusProvider>,
        extractor: Arc<ContentExtractor>,
        chunker: ChunkerConfig,
        llm: LlmService,
    ) -> Self {
        Self {
            corpus,
            extractor,
            chunker,
            llm,
            ranker: Box::new(LinearCosineRanker),
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
            building: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            build_lock: Mutex::new(BuildLedger::default()),
        }
    }

    pub fn with_ranker(mut self, ranker: Box<dyn SimilarityRanker>) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, next: IndexSnapshot) {
        let next = Arc::new(next);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().ready
    }

    pub fn status(&self) -> IndexStatus {
        let snapshot = self.snapshot();
        IndexStatus {
            ready: snapshot.ready,
            building: self.building.load(Ordering::SeqCst),
            chunk_count: snapshot.chunks.len(),
            built_at: snapshot.built_at,
        }
    }

    /// Makes the index ready, building it if needed (or always, when
    /// `force` is set).
    pub async fn ensure(&self, force: bool) -> Result<(), ApiError> {
        if !force && self.is_ready() {
            return Ok(());
        }

        let observed = self.generation.load(Ordering::SeqCst);
        let mut ledger = self.build_lock.lock().await;

        if ledger.finished != observed {
            // another caller's build completed while we waited
            return match &ledger.last_error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            };
        }
        if !force && self.is_ready() {
            return Ok(());
        }

        let result = {
            let _building = BuildingGuard::raise(&self.building);
            self.build().await
        };

        ledger.finished += 1;
        ledger.last_error = result.as_ref().err().cloned();
        self.generation.store(ledger.finished, Ordering::SeqCst);
        result
    }

    async fn build(&self) -> Result<(), ApiError> {
        let started = Instant::now();
        tracing::info!("Building docs index");

        let corpus = self.corpus.clone();
        let extractor = self.extractor.clone();
        let chunker = self.chunker;
        let pending = tokio::task::spawn_blocking(move || {
            collect_chunks(corpus.as_ref(), extractor.as_ref(), &chunker)
        })
        .await
        .map_err(ApiError::internal)?;

        if pending.is_empty() {
            tracing::warn!("Docs corpus produced no chunks; index is empty");
            self.publish(IndexSnapshot {
                ready: true,
                chunks: Vec::new(),
                built_at: Some(Utc::now()),
            });
            return Ok(());
        }

        let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
        let vectors = match self.llm.embed_documents(&texts).await {
            Ok(vectors) => vectors,
            Err(err) => {
                tracing::error!("Docs index build failed: {}", err);
                return Err(err);
            }
        };

        let chunks: Vec<IndexedChunk> = pending
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();
        let count = chunks.len();

        self.publish(IndexSnapshot {
            ready: true,
            chunks,
            built_at: Some(Utc::now()),
        });
        tracing::info!(
            "Docs index ready: {} chunks in {} ms",
            count,
            started.elapsed().as_millis()
        );
        Ok(())
    }

    /// Top `top_k` chunks of the published snapshot for `query`.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<QueryResult> {
        let snapshot = self.snapshot();
        let candidates: Vec<&[f32]> = snapshot
            .chunks
            .iter()
            .map(|c| c.embedding.as_slice())
            .collect();

        self.ranker
            .rank(query, &candidates, top_k)
            .into_iter()
            .filter_map(|(idx, score)| {
                snapshot.chunks.get(idx).map(|indexed| QueryResult {
                    chunk: indexed.chunk.clone(),
                    score,
                })
            })
            .collect()
    }

    /// Embeds `query` and searches, building the index first if needed.
    pub async fn query(&self, query: &str, top_k: usize) -> Result<Vec<QueryResult>, ApiError> {
        self.ensure(false).await?;
        let vector = self.llm.embed_query(query).await?;
        Ok(self.search(&vector, top_k))
    }

    pub fn llm(&self) -> &LlmService {
        &self.llm
    }
}

/// Scan, extract, normalize and chunk the whole corpus.
fn collect_chunks(
    corpus: &dyn CorpusProvider,
    extractor: &ContentExtractor,
    chunker: &ChunkerConfig,
) -> Vec<Chunk> {
    let prefix = corpus.docs_prefix().to_string();
    let mut chunks = Vec::new();
    let mut documents = 0usize;

    for document in corpus.scan() {
        documents += 1;
        let uri = page_uri(&document.path, &prefix);
        let mut ordinal = 0usize;
        for block in extractor.extract_document(&document) {
            let normalized = chunker.normalize(&block.text);
            for text in chunker.chunk(&normalized) {
                chunks.push(Chunk {
                    id: format!("{}:{}", block.source_path, ordinal),
                    path: block.source_path.clone(),
                    uri: uri.clone(),
                    text,
                });
                ordinal += 1;
            }
        }
    }

    tracing::debug!("Scanned {} documents into {} chunks", documents, chunks.len());
    chunks
}
