//! docsum Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for local development.

use crate::SummaryMethod;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Vector store configuration
    pub store: StoreConfig,

    /// Text generation provider configuration
    pub llm: LlmConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Chunking parameters
    pub chunking: ChunkingConfig,

    /// Summarization parameters
    pub summarizer: SummarizerSettings,

    /// Evaluation inputs
    pub evaluation: EvaluationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "chunking.chunk_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(ConfigError::InvalidValue {
                key: "chunking.overlap".to_string(),
                value: self.chunking.overlap.to_string(),
            });
        }
        if self.embedding.dimension == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "embedding.dimension".to_string(),
                value: "0".to_string(),
            });
        }
        if self.summarizer.map_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "summarizer.map_concurrency".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Store
        if let Ok(backend) = std::env::var("DOCSUM_STORE_BACKEND") {
            self.store.backend = backend.parse()?;
        }
        if let Ok(path) = std::env::var("DOCSUM_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Ok(collection) = std::env::var("DOCSUM_COLLECTION") {
            self.store.collection = collection;
        }
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.store.qdrant_url = url;
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key.clone());
            self.embedding.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url.clone());
            self.embedding.openai_base_url = Some(url);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.llm.ollama_url = url.clone();
            self.embedding.ollama_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }

        // Embedding
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            self.embedding.provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(dimension) = std::env::var("EMBEDDING_DIMENSION") {
            let parsed = dimension.parse().map_err(|_| ConfigError::InvalidValue {
                key: "EMBEDDING_DIMENSION".to_string(),
                value: dimension.clone(),
            })?;
            self.embedding.dimension = Some(parsed);
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }
}

/// Which vector store implementation backs collections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON files on local disk
    #[default]
    Local,
    /// Qdrant over gRPC
    Qdrant,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(ConfigError::InvalidValue {
                key: "DOCSUM_STORE_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Granularity of indexed vectors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingSetting {
    /// One vector per whole document
    #[default]
    Document,
    /// One vector per chunk
    Chunk,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend to use
    pub backend: StoreBackend,

    /// Directory holding the local store
    pub path: PathBuf,

    /// Qdrant gRPC URL
    pub qdrant_url: String,

    /// Default collection name
    pub collection: String,

    /// Index whole documents or chunks
    pub indexing: IndexingSetting,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Local,
            path: PathBuf::from("./data/vector_store"),
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "LLM-Test-Instadeep".to_string(),
            indexing: IndexingSetting::Document,
        }
    }
}

/// Text generation provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use
    pub model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Embedding model name
    pub model: String,

    /// Vector length produced by the model; inferred from known model
    /// names when unset
    pub dimension: Option<usize>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Cache embeddings in memory
    pub cache_enabled: bool,

    /// Maximum cached embeddings
    pub cache_capacity: u64,

    /// Cache entry lifetime in seconds
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            dimension: None,
            timeout_secs: 30,
            cache_enabled: true,
            cache_capacity: 10_000,
            cache_ttl_secs: 3600,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Chunking parameters, in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 3000,
            overlap: 300,
        }
    }
}

/// Summarization parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerSettings {
    /// Strategy used when none is requested
    pub method: SummaryMethod,

    /// Concurrent map calls
    pub map_concurrency: usize,

    /// Combined partial-summary size (characters) that triggers collapsing
    pub reduce_threshold: usize,

    /// Upper bound on collapse rounds before the final combine
    pub max_collapse_rounds: usize,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Use streaming transport
    pub stream: bool,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            method: SummaryMethod::MapReduce,
            map_concurrency: 4,
            reduce_threshold: 6000,
            max_collapse_rounds: 3,
            timeout_secs: 120,
            stream: false,
        }
    }
}

/// Evaluation inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// JSON file mapping document file names to reference summaries
    pub references_path: Option<PathBuf>,

    /// Stem tokens before ROUGE matching
    pub use_stemmer: bool,

    /// Compute the embedding-based semantic score
    pub semantic_score: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            references_path: None,
            use_stemmer: true,
            semantic_score: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<ConfigError> for crate::DocsumError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.store.collection, "LLM-Test-Instadeep");
        assert_eq!(config.store.backend, StoreBackend::Local);
        assert_eq!(config.summarizer.method, SummaryMethod::MapReduce);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "ollama".parse::<LlmProvider>().unwrap(),
            LlmProvider::Ollama
        );
        assert!("invalid".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("Qdrant".parse::<StoreBackend>().unwrap(), StoreBackend::Qdrant);
        assert!("chroma".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[chunking]
chunk_size = 1200

[summarizer]
method = "refine"
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.chunking.chunk_size, 1200);
        assert_eq!(config.chunking.overlap, 300);
        assert_eq!(config.summarizer.method, SummaryMethod::Refine);
        assert_eq!(config.summarizer.map_concurrency, 4);
    }

    #[test]
    fn test_embedding_dimension_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[embedding]
model = "bge-m3"
dimension = 1024
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.embedding.model, "bge-m3");
        assert_eq!(config.embedding.dimension, Some(1024));
        assert_eq!(AppConfig::default().embedding.dimension, None);

        let mut zero = config.clone();
        zero.embedding.dimension = Some(0);
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "embedding.dimension"
        ));
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chunking = 3").unwrap();

        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_validate_rejects_overlap_not_below_size() {
        let mut config = AppConfig::default();
        config.chunking.chunk_size = 100;
        config.chunking.overlap = 100;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "chunking.overlap"
        ));
    }
}
