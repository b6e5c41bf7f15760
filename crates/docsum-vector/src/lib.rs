//! docsum Vector - Embeddings and similarity search
//!
//! Provides the [`VectorStore`] abstraction with a persistent local backend
//! and a Qdrant backend, embedding clients for OpenAI and Ollama, and the
//! [`VectorIndex`] that binds the two together.

use async_trait::async_trait;
use docsum_core::{DocsumError, Metadata, Result};
use serde::{Deserialize, Serialize};

pub mod cache;
pub mod embedding;
pub mod index;
pub mod local_store;
pub mod qdrant_store;
pub mod retriever;

pub use cache::{CacheStats, CachedEmbedding};
pub use embedding::{create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiEmbedding};
pub use index::{IndexingMode, VectorIndex};
pub use local_store::LocalVectorStore;
pub use qdrant_store::QdrantStore;
pub use retriever::VectorRetriever;

/// Longest accepted collection name
pub const MAX_COLLECTION_NAME_LEN: usize = 63;

/// Similarity metric of a collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length (lower is closer)
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }
}

/// A named vector collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    /// Model that produced the stored vectors
    #[serde(default)]
    pub embedding_model: String,
}

impl Collection {
    pub fn new(name: impl Into<String>, dimension: usize, embedding_model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric: DistanceMetric::Cosine,
            embedding_model: embedding_model.into(),
        }
    }

    /// Set the metric
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Reject a vector whose length differs from the collection dimension
    pub fn check_dimension(&self, values: &[f32]) -> Result<()> {
        if values.len() == self.dimension {
            Ok(())
        } else {
            Err(DocsumError::DimensionMismatch {
                expected: self.dimension,
                actual: values.len(),
            })
        }
    }
}

/// A vector tagged with the id of the item it embeds
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    pub owner_id: String,
    pub values: Vec<f32>,
}

/// An item to insert into a collection
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub vector: EmbeddingVector,
    pub metadata: Metadata,
}

/// A stored item matched by a search
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub distance: f32,
    /// Insertion sequence within the collection
    pub seq: u64,
}

/// Trait for vector database operations
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a collection, failing with `CollectionExists` if the name is taken
    async fn create_collection(&self, collection: &Collection) -> Result<()>;

    /// Look up a collection's definition
    async fn get_collection(&self, name: &str) -> Result<Collection>;

    /// All collections, sorted by name
    async fn list_collections(&self) -> Result<Vec<Collection>>;

    /// Drop a collection and everything in it
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert records in order and return how many were stored.
    ///
    /// Stops at the first record whose id is already present (in the
    /// collection or earlier in the same batch) and returns `DuplicateId`;
    /// records before it stay stored.
    async fn insert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<usize>;

    /// The `k` nearest records, ascending by distance, ties by insertion order
    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>>;

    /// Number of stored records
    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Reject names that are empty, too long, or contain characters outside
/// `[A-Za-z0-9._-]`
pub fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_COLLECTION_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && name != "."
        && name != "..";

    if valid {
        Ok(())
    } else {
        Err(DocsumError::InvalidCollectionName(name.to_string()))
    }
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Sort by distance, then insertion sequence, and keep the first `k`
pub(crate) fn rank(mut hits: Vec<ScoredRecord>, k: usize) -> Vec<ScoredRecord> {
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.seq.cmp(&b.seq)));
    hits.truncate(k);
    hits
}
