//! Components built from configuration

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use docsum_core::{
    AppConfig, IndexingSetting, LlmClient, ProgressSink, StoreBackend, TracingProgress,
};
use docsum_eval::{EmbeddingSemanticScorer, Evaluator};
use docsum_parser::{ChunkConfig, Chunker};
use docsum_summarize::{create_llm_client, Summarizer, SummarizerConfig};
use docsum_vector::{
    create_embedding_client, EmbeddingClient, IndexingMode, LocalVectorStore, QdrantStore,
    VectorIndex, VectorStore,
};

/// Vector store owned by the process
pub enum StoreHandle {
    Local(Arc<LocalVectorStore>),
    Qdrant(Arc<QdrantStore>),
}

impl StoreHandle {
    pub async fn open(config: &AppConfig) -> anyhow::Result<Self> {
        match config.store.backend {
            StoreBackend::Local => {
                let store = LocalVectorStore::open(&config.store.path)
                    .await
                    .with_context(|| format!("opening vector store at {}", config.store.path.display()))?;
                Ok(Self::Local(Arc::new(store)))
            }
            StoreBackend::Qdrant => {
                let store = QdrantStore::from_config(&config.store)
                    .with_context(|| format!("connecting to qdrant at {}", config.store.qdrant_url))?;
                Ok(Self::Qdrant(Arc::new(store)))
            }
        }
    }

    pub fn as_store(&self) -> Arc<dyn VectorStore> {
        match self {
            Self::Local(store) => store.clone(),
            Self::Qdrant(store) => store.clone(),
        }
    }

    /// Flush and release the store once the last user has been dropped
    pub async fn close(self) -> anyhow::Result<()> {
        match self {
            Self::Local(store) => match Arc::try_unwrap(store) {
                Ok(store) => store.close().await.context("closing vector store"),
                Err(_) => {
                    tracing::warn!("vector store still in use, skipping close");
                    Ok(())
                }
            },
            Self::Qdrant(_) => Ok(()),
        }
    }
}

/// Components shared by the CLI commands
pub struct AppContext {
    pub config: AppConfig,
    pub progress: Arc<dyn ProgressSink>,
    store: Option<StoreHandle>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
    index: Option<Arc<VectorIndex>>,
    llm: Option<Arc<dyn LlmClient>>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            progress: Arc::new(TracingProgress),
            store: None,
            embedder: None,
            index: None,
            llm: None,
        }
    }

    pub fn chunker(&self) -> anyhow::Result<Chunker> {
        let config = ChunkConfig::try_from(&self.config.chunking)?;
        Ok(Chunker::new(config)?)
    }

    pub fn embedder(&mut self) -> anyhow::Result<Arc<dyn EmbeddingClient>> {
        if let Some(embedder) = &self.embedder {
            return Ok(embedder.clone());
        }
        let embedder = create_embedding_client(&self.config.embedding)?;
        tracing::info!(model = %embedder.model(), dimension = embedder.dimension(), "embedding client ready");
        self.embedder = Some(embedder.clone());
        Ok(embedder)
    }

    pub async fn index(&mut self) -> anyhow::Result<Arc<VectorIndex>> {
        if let Some(index) = &self.index {
            return Ok(index.clone());
        }

        let embedder = self.embedder()?;
        let handle = match self.store.take() {
            Some(handle) => handle,
            None => StoreHandle::open(&self.config).await?,
        };
        let store = handle.as_store();
        self.store = Some(handle);

        let mode = match self.config.store.indexing {
            IndexingSetting::Document => IndexingMode::Document,
            IndexingSetting::Chunk => IndexingMode::Chunked(self.chunker()?),
        };
        let index = Arc::new(
            VectorIndex::new(store, embedder)
                .with_mode(mode)
                .with_embedding_timeout(Duration::from_secs(self.config.embedding.timeout_secs)),
        );
        self.index = Some(index.clone());
        Ok(index)
    }

    pub fn llm(&mut self) -> anyhow::Result<Arc<dyn LlmClient>> {
        if let Some(llm) = &self.llm {
            return Ok(llm.clone());
        }
        let llm = create_llm_client(&self.config.llm)?;
        tracing::info!(model = %llm.model(), "llm client ready");
        self.llm = Some(llm.clone());
        Ok(llm)
    }

    pub fn summarizer(&mut self) -> anyhow::Result<Summarizer> {
        let llm = self.llm()?;
        Ok(
            Summarizer::new(llm, SummarizerConfig::from(&self.config.summarizer))
                .with_progress(self.progress.clone()),
        )
    }

    pub fn evaluator(&mut self) -> anyhow::Result<Evaluator> {
        let evaluator = Evaluator::from_config(&self.config.evaluation)?;
        if !self.config.evaluation.semantic_score {
            return Ok(evaluator);
        }
        let scorer = EmbeddingSemanticScorer::new(self.embedder()?);
        Ok(evaluator.with_semantic_scorer(Arc::new(scorer)))
    }

    /// Drop every component and close the store
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.index = None;
        match self.store.take() {
            Some(handle) => handle.close().await,
            None => Ok(()),
        }
    }
}
