//! docsum Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout docsum:
//! - Document, chunk and summary models
//! - Query results returned by the vector index
//! - Common error types
//! - Shared traits for text generation and retrieval
//! - Progress events emitted by pipeline stages
//! - Configuration management

pub mod config;
pub mod events;

pub use config::{
    AppConfig, ChunkingConfig, ConfigError, EmbeddingConfig, EvaluationConfig, IndexingSetting,
    LlmConfig, LlmProvider, LoggingConfig, StoreBackend, StoreConfig, SummarizerSettings,
};
pub use events::{NoopProgress, PipelineEvent, ProgressSink, TracingProgress};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for docsum operations
#[derive(Error, Debug)]
pub enum DocsumError {
    #[error("Failed to load document {path}: {message}")]
    Load { path: String, message: String },

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),

    #[error("Duplicate id in collection {collection}: {id}")]
    DuplicateId { collection: String, id: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding request timed out after {0}s")]
    EmbeddingTimeout(u64),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Generation request timed out after {0}s")]
    GenerationTimeout(u64),

    #[error("Summarization failed during {stage}: {source}")]
    Summarization {
        stage: SummaryStage,
        #[source]
        source: Box<DocsumError>,
    },

    #[error("Nothing to summarize for document {0}")]
    EmptyDocument(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DocsumError {
    /// True for the timeout variants, including timeouts wrapped by a summarization stage
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::EmbeddingTimeout(_) | Self::GenerationTimeout(_) => true,
            Self::Summarization { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DocsumError>;

// ============================================================================
// Document Models
// ============================================================================

/// Open string-to-string metadata mapping stored alongside vectors
pub type Metadata = BTreeMap<String, String>;

/// Metadata key holding the document title
pub const TITLE_KEY: &str = "title";

/// Metadata key holding the original file path
pub const SOURCE_PATH_KEY: &str = "source_path";

/// Metadata key holding the owning document id of an indexed chunk
pub const SOURCE_DOCUMENT_KEY: &str = "source_document_id";

/// Metadata key holding the position of an indexed chunk
pub const ORDER_INDEX_KEY: &str = "order_index";

/// A loaded document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier, assigned at ingestion
    pub id: String,

    /// Full extracted content
    pub text: String,

    /// Document title (empty if unavailable)
    #[serde(default)]
    pub title: String,

    /// Original file path, if the document came from disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

impl Document {
    /// Create a new document without a title
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            title: String::new(),
            source_path: None,
        }
    }

    /// Set title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the originating file path
    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Metadata stored with this document's vector
    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(TITLE_KEY.to_string(), self.title.clone());
        if let Some(path) = &self.source_path {
            metadata.insert(SOURCE_PATH_KEY.to_string(), path.clone());
        }
        metadata
    }

    /// Character count of the text
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// A contiguous, overlapping segment of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Id of the document this chunk was cut from
    pub source_document_id: String,

    /// Chunk text (a substring of the source)
    pub text: String,

    /// Position within the source's chunk sequence
    pub order_index: u32,

    /// Starting character offset in the source text
    pub start_offset: usize,

    /// Ending character offset (exclusive)
    pub end_offset: usize,
}

impl Chunk {
    /// Id used when the chunk is indexed on its own
    pub fn indexed_id(&self) -> String {
        format!("{}#{}", self.source_document_id, self.order_index)
    }

    /// Character count of the chunk text
    pub fn char_count(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

// ============================================================================
// Search Types
// ============================================================================

/// One ranked match from the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    /// Matched document (or chunk, when indexing per chunk)
    pub document: Document,

    /// Cosine distance to the query (lower is closer)
    pub distance: f32,

    /// Metadata stored with the vector
    pub metadata: Metadata,
}

/// Hits sorted ascending by distance, at most `k` long
pub type QueryResult = Vec<QueryHit>;

// ============================================================================
// Summary Types
// ============================================================================

/// Multi-stage summarization strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMethod {
    #[default]
    MapReduce,
    Refine,
}

impl std::fmt::Display for SummaryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MapReduce => write!(f, "map_reduce"),
            Self::Refine => write!(f, "refine"),
        }
    }
}

impl std::str::FromStr for SummaryMethod {
    type Err = DocsumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "map_reduce" | "mapreduce" => Ok(Self::MapReduce),
            "refine" => Ok(Self::Refine),
            _ => Err(DocsumError::Config(format!("unknown summary method: {s}"))),
        }
    }
}

/// Stage of a summarization run, used to locate failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStage {
    Map,
    Collapse,
    Reduce,
    Refine,
}

impl std::fmt::Display for SummaryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Map => write!(f, "map"),
            Self::Collapse => write!(f, "collapse"),
            Self::Reduce => write!(f, "reduce"),
            Self::Refine => write!(f, "refine"),
        }
    }
}

/// A generated summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Id of the summarized document
    pub source_document_id: String,

    /// Summary text
    pub text: String,

    /// Strategy that produced it
    pub method: SummaryMethod,

    /// Generation timestamp
    pub generated_at: DateTime<Utc>,
}

impl Summary {
    /// Create a summary stamped with the current time
    pub fn new(
        source_document_id: impl Into<String>,
        text: impl Into<String>,
        method: SummaryMethod,
    ) -> Self {
        Self {
            source_document_id: source_document_id.into(),
            text: text.into(),
            method,
            generated_at: Utc::now(),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A role-structured prompt: system instruction plus user content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Create a prompt
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Total character count across both roles
    pub fn char_count(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }
}

/// Trait for LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response
    async fn generate(&self, prompt: &Prompt) -> Result<String>;

    /// Generate a streaming response
    async fn generate_stream(
        &self,
        prompt: &Prompt,
    ) -> Result<futures::stream::BoxStream<'static, Result<String>>>;

    /// Model identifier for logging
    fn model(&self) -> &str;
}

/// Trait for retrieving ranked documents for a query
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` documents, closest first
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Document>>;

    /// Get retriever name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
