use std::sync::Arc;

use crate::core::config::{AppPaths, AppSettings, ConfigService};
use crate::llm::LlmService;
use crate::rag::{
    ChunkerConfig, ContentExtractor, CorpusProvider, DocsCatalog, DocsIndex, FsCorpus,
    RagPipeline,
};
use crate::tools::DocsTools;

pub mod error;

use error::InitializationError;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: AppSettings,
    pub llm: LlmService,
    pub index: Arc<DocsIndex>,
    pub pipeline: RagPipeline,
    pub tools: Arc<DocsTools>,
}

impl AppState {
    /// Loads configuration and wires the corpus, index, pipeline and tools.
    ///
    /// The index itself is built lazily on first use unless
    /// `index.warm_on_startup` is set.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());

        let raw = config.load_config().map_err(InitializationError::Config)?;
        tracing::info!(
            "Loaded config from {}: {}",
            config.config_path().display(),
            config.redact_sensitive_values(&raw)
        );
        let settings =
            AppSettings::from_env(&raw, &paths).map_err(InitializationError::Config)?;

        let llm = LlmService::from_settings(&settings.llm).map_err(InitializationError::Llm)?;
        tracing::info!(
            "Using {} for chat; embeddings {}",
            settings.llm.display_name(),
            if llm.embeddings_available() {
                "available"
            } else {
                "unavailable"
            }
        );

        let state = Self::assemble(paths, config, settings, llm)?;

        if state.settings.index.warm_on_startup {
            let index = state.index.clone();
            tokio::spawn(async move {
                if let Err(e) = index.ensure(false).await {
                    tracing::warn!("Failed to warm docs index on startup: {}", e);
                }
            });
        }

        Ok(Arc::new(state))
    }

    pub(crate) fn assemble(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: AppSettings,
        llm: LlmService,
    ) -> Result<Self, InitializationError> {
        let corpus: Arc<dyn CorpusProvider> = Arc::new(FsCorpus::new(&settings.docs));
        Self::with_corpus(paths, config, settings, llm, corpus)
    }

    pub(crate) fn with_corpus(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: AppSettings,
        llm: LlmService,
        corpus: Arc<dyn CorpusProvider>,
    ) -> Result<Self, InitializationError> {
        let extractor = Arc::new(ContentExtractor::new().map_err(InitializationError::Extractor)?);
        let chunker =
            ChunkerConfig::from_settings(&settings.index).map_err(InitializationError::Index)?;

        let index = Arc::new(DocsIndex::new(
            corpus.clone(),
            extractor.clone(),
            chunker,
            llm.clone(),
        ));
        let pipeline = RagPipeline::new(index.clone(), llm.clone(), settings.rag.clone());
        let catalog = DocsCatalog::new(corpus, extractor);
        let tools = Arc::new(
            DocsTools::new(index.clone(), catalog).map_err(InitializationError::Tools)?,
        );

        Ok(Self {
            paths,
            config,
            settings,
            llm,
            index,
            pipeline,
            tools,
        })
    }
}
