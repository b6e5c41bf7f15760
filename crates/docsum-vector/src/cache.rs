//! Embedding cache
//!
//! [`CachedEmbedding`] decorates any [`EmbeddingClient`] with a moka
//! cache so repeated texts (re-ingestion, repeated queries, reference
//! sentences during evaluation) are only embedded once. Entries are keyed
//! by the full text; one cache wraps one model.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docsum_core::{DocsumError, EmbeddingConfig, Result};
use moka::future::Cache;

use crate::embedding::EmbeddingClient;

/// Embedding client decorator backed by a concurrent TTL cache
pub struct CachedEmbedding {
    inner: Arc<dyn EmbeddingClient>,
    cache: Cache<String, Vec<f32>>,
    stats: Arc<CacheStats>,
}

impl CachedEmbedding {
    /// Wrap `inner` with the given capacity and entry lifetime
    pub fn new(inner: Arc<dyn EmbeddingClient>, max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            inner,
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Wrap `inner` using the cache settings in `config`
    pub fn from_config(inner: Arc<dyn EmbeddingClient>, config: &EmbeddingConfig) -> Self {
        Self::new(
            inner,
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        )
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    async fn lookup(&self, text: &str) -> Option<Vec<f32>> {
        let result = self.cache.get(text).await;
        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        result
    }
}

#[async_trait]
impl EmbeddingClient for CachedEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.lookup(text).await {
            return Ok(vector);
        }

        let vector = self.inner.embed(text).await?;
        self.cache.insert(text.to_string(), vector.clone()).await;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing = Vec::new();
        let mut missing_positions = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let cached = self.lookup(text).await;
            if cached.is_none() {
                missing.push(text.clone());
                missing_positions.push(i);
            }
            results.push(cached);
        }

        if !missing.is_empty() {
            let computed = self.inner.embed_batch(&missing).await?;
            for ((position, text), vector) in missing_positions.into_iter().zip(&missing).zip(computed) {
                self.cache.insert(text.clone(), vector.clone()).await;
                results[position] = Some(vector);
            }
        }

        tracing::debug!(
            requested = texts.len(),
            computed = missing.len(),
            hit_rate = self.stats.hit_rate(),
            "cached embedding batch"
        );

        results
            .into_iter()
            .map(|v| {
                v.ok_or_else(|| {
                    DocsumError::Embedding(
                        "Embedding provider returned fewer vectors than requested".to_string(),
                    )
                })
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Statistics for cache performance monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get total misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingEmbedding {
        calls: AtomicUsize,
        texts: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model(&self) -> &str {
            "counting"
        }
    }

    fn cached() -> (Arc<CountingEmbedding>, CachedEmbedding) {
        let inner = Arc::new(CountingEmbedding {
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        });
        let cached = CachedEmbedding::new(inner.clone(), 100, Duration::from_secs(60));
        (inner, cached)
    }

    #[tokio::test]
    async fn test_repeated_text_hits_cache() {
        let (inner, cache) = cached();

        let first = cache.embed("hello").await.unwrap();
        let second = cache.embed("hello").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert!((cache.stats().hit_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_batch_only_embeds_missing_texts() {
        let (inner, cache) = cached();
        cache.embed("bb").await.unwrap();

        let texts = vec!["a".to_string(), "bb".to_string(), "ccc".to_string()];
        let vectors = cache.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![2.0, 1.0], vec![3.0, 1.0]]);
        assert_eq!(inner.texts.load(Ordering::SeqCst), 3);
        assert_eq!(cache.dimension(), 2);
        assert_eq!(cache.model(), "counting");
    }

    #[tokio::test]
    async fn test_entries_are_keyed_by_full_text() {
        let (inner, cache) = cached();
        let long = "x".repeat(4096);
        let longer = format!("{long}y");

        assert_eq!(cache.embed(&long).await.unwrap(), vec![4096.0, 1.0]);
        assert_eq!(cache.embed(&longer).await.unwrap(), vec![4097.0, 1.0]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);

        assert_eq!(cache.cache.get(longer.as_str()).await, Some(vec![4097.0, 1.0]));
        assert!(cache.cache.get("x").await.is_none());
    }
}
