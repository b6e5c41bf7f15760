//! Vector index: embedding provider bound to a vector store
//!
//! [`VectorIndex`] is the surface the pipeline talks to. It embeds
//! documents (or their chunks) with one provider, stores them in a
//! [`VectorStore`], and embeds queries with the same provider.

use std::sync::Arc;
use std::time::Duration;

use docsum_core::{
    DocsumError, Document, Metadata, QueryHit, QueryResult, Result, ORDER_INDEX_KEY,
    SOURCE_DOCUMENT_KEY, SOURCE_PATH_KEY, TITLE_KEY,
};
use docsum_parser::Chunker;

use crate::embedding::EmbeddingClient;
use crate::{Collection, DistanceMetric, EmbeddingVector, ScoredRecord, VectorRecord, VectorStore};

/// Texts per embedding request
const EMBED_BATCH_SIZE: usize = 32;

/// What each stored vector represents
#[derive(Debug, Clone, Copy, Default)]
pub enum IndexingMode {
    /// One vector per whole document
    #[default]
    Document,
    /// One vector per chunk, ids `"{document_id}#{order_index}"`
    Chunked(Chunker),
}

/// Similarity index over one embedding provider and one store
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    mode: IndexingMode,
    embedding_timeout: Duration,
}

impl VectorIndex {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            store,
            embedder,
            mode: IndexingMode::Document,
            embedding_timeout: Duration::from_secs(30),
        }
    }

    /// Index documents whole or per chunk
    pub fn with_mode(mut self, mode: IndexingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Upper bound on each embedding call
    pub fn with_embedding_timeout(mut self, timeout: Duration) -> Self {
        self.embedding_timeout = timeout;
        self
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Create an empty collection sized for this index's embedding provider
    pub async fn create_collection(&self, name: &str, metric: DistanceMetric) -> Result<Collection> {
        let collection =
            Collection::new(name, self.embedder.dimension(), self.embedder.model()).with_metric(metric);
        self.store.create_collection(&collection).await?;
        Ok(collection)
    }

    /// Reopen a persisted collection, checking it matches this provider
    pub async fn open_collection(&self, name: &str) -> Result<Collection> {
        let collection = self.store.get_collection(name).await?;

        if collection.dimension != self.embedder.dimension() {
            return Err(DocsumError::DimensionMismatch {
                expected: collection.dimension,
                actual: self.embedder.dimension(),
            });
        }
        if !collection.embedding_model.is_empty() && collection.embedding_model != self.embedder.model() {
            tracing::warn!(
                collection = %name,
                stored_model = %collection.embedding_model,
                current_model = %self.embedder.model(),
                "collection was built with a different embedding model"
            );
        }
        Ok(collection)
    }

    /// Open `name` if it exists, otherwise create it
    pub async fn open_or_create_collection(&self, name: &str) -> Result<Collection> {
        match self.open_collection(name).await {
            Err(DocsumError::CollectionNotFound(_)) => {
                self.create_collection(name, DistanceMetric::Cosine).await
            }
            other => other,
        }
    }

    /// Embed and store documents, returning how many vectors were written.
    ///
    /// Stops at the first duplicate id; everything before it stays stored.
    pub async fn add(&self, collection: &str, documents: &[Document]) -> Result<usize> {
        let records = self.records(documents);
        if records.is_empty() {
            return Ok(0);
        }

        let mut stored = 0;
        for batch in records.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|(_, text, _)| text.clone()).collect();
            let vectors = self.embed_batch(&texts).await?;

            let batch_records = batch
                .iter()
                .zip(vectors)
                .map(|((id, text, metadata), values)| VectorRecord {
                    id: id.clone(),
                    text: text.clone(),
                    vector: EmbeddingVector {
                        owner_id: id.clone(),
                        values,
                    },
                    metadata: metadata.clone(),
                })
                .collect();

            stored += self.store.insert(collection, batch_records).await?;
        }

        tracing::info!(collection = %collection, documents = documents.len(), vectors = stored, "documents indexed");
        Ok(stored)
    }

    /// The `k` closest stored items to `query_text`, ascending by distance
    pub async fn query(&self, collection: &str, query_text: &str, k: usize) -> Result<QueryResult> {
        if k == 0 {
            // Still surfaces a missing collection.
            self.store.count(collection).await?;
            return Ok(Vec::new());
        }

        let vector = self.embed(query_text).await?;
        let hits = self.store.search(collection, &vector, k).await?;

        tracing::debug!(collection = %collection, k, hits = hits.len(), "query executed");
        Ok(hits.into_iter().map(into_hit).collect())
    }

    fn records(&self, documents: &[Document]) -> Vec<(String, String, Metadata)> {
        match &self.mode {
            IndexingMode::Document => documents
                .iter()
                .map(|doc| (doc.id.clone(), doc.text.clone(), doc.metadata()))
                .collect(),
            IndexingMode::Chunked(chunker) => documents
                .iter()
                .flat_map(|doc| {
                    let base = doc.metadata();
                    chunker.chunk_document(doc).into_iter().map(move |chunk| {
                        let mut metadata = base.clone();
                        metadata.insert(SOURCE_DOCUMENT_KEY.to_string(), chunk.source_document_id.clone());
                        metadata.insert(ORDER_INDEX_KEY.to_string(), chunk.order_index.to_string());
                        (chunk.indexed_id(), chunk.text, metadata)
                    })
                })
                .collect(),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        tokio::time::timeout(self.embedding_timeout, self.embedder.embed(text))
            .await
            .map_err(|_| DocsumError::EmbeddingTimeout(self.embedding_timeout.as_secs()))?
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = tokio::time::timeout(self.embedding_timeout, self.embedder.embed_batch(texts))
            .await
            .map_err(|_| DocsumError::EmbeddingTimeout(self.embedding_timeout.as_secs()))??;

        if vectors.len() != texts.len() {
            return Err(DocsumError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

fn into_hit(record: ScoredRecord) -> QueryHit {
    let mut document = Document::new(record.id, record.text);
    if let Some(title) = record.metadata.get(TITLE_KEY) {
        document.title = title.clone();
    }
    document.source_path = record.metadata.get(SOURCE_PATH_KEY).cloned();

    QueryHit {
        document,
        distance: record.distance,
        metadata: record.metadata,
    }
}
