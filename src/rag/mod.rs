//! Docs retrieval: corpus scanning, extraction, chunking, the embedding
//! index and the question-answering pipeline built on top of it.

pub mod catalog;
pub mod chunker;
pub mod context;
pub mod extractor;
pub mod index;
pub mod pipeline;
pub mod ranker;
pub mod scanner;
pub mod stream;


pub use catalog::{DocPage, DocSummary, DocsCatalog};
pub use chunker::ChunkerConfig;
pub use extractor::ContentExtractor;
pub use index::{DocsIndex, IndexStatus, QueryResult};
pub use pipeline::{RagAnswer, RagPipeline};
pub use scanner::{CorpusProvider, DocumentRecord, FsCorpus, MemoryCorpus};
pub use stream::StreamEvent;
