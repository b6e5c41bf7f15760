//! Embedding-based semantic similarity (BERTScore-style)
//!
//! Both texts are split into sentences and embedded. Every candidate
//! sentence is greedily matched to its most similar reference sentence
//! (precision) and vice versa (recall); the score is their F1.

use std::sync::Arc;

use async_trait::async_trait;
use docsum_core::{DocsumError, Result};
use docsum_vector::{cosine_similarity, EmbeddingClient};

use crate::rouge::f_measure;

/// Semantic similarity between a candidate and a reference text
#[async_trait]
pub trait SemanticScorer: Send + Sync {
    async fn score(&self, candidate: &str, reference: &str) -> Result<f32>;

    fn name(&self) -> &str;
}

/// Split on sentence-ending punctuation and newlines, dropping empty pieces
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c == '\n' {
            push_sentence(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?' | '。') {
            push_sentence(&mut sentences, &mut current);
        }
    }
    push_sentence(&mut sentences, &mut current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if trimmed.chars().any(char::is_alphanumeric) {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

/// Mean over `from` of the best similarity against any vector in `to`
fn greedy_match(from: &[Vec<f32>], to: &[Vec<f32>]) -> f32 {
    if from.is_empty() || to.is_empty() {
        return 0.0;
    }
    let total: f32 = from
        .iter()
        .map(|a| {
            to.iter()
                .map(|b| cosine_similarity(a, b))
                .fold(f32::NEG_INFINITY, f32::max)
        })
        .sum();
    total / from.len() as f32
}

/// [`SemanticScorer`] over an [`EmbeddingClient`]
pub struct EmbeddingSemanticScorer {
    embedder: Arc<dyn EmbeddingClient>,
}

impl EmbeddingSemanticScorer {
    pub fn new(embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl SemanticScorer for EmbeddingSemanticScorer {
    async fn score(&self, candidate: &str, reference: &str) -> Result<f32> {
        let candidate_sentences = split_sentences(candidate);
        let reference_sentences = split_sentences(reference);
        if candidate_sentences.is_empty() || reference_sentences.is_empty() {
            return Ok(0.0);
        }

        let split = candidate_sentences.len();
        let texts: Vec<String> = candidate_sentences
            .into_iter()
            .chain(reference_sentences)
            .collect();
        let mut vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(DocsumError::Evaluation(format!(
                "expected {} sentence embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        let reference_vectors = vectors.split_off(split);

        let precision = greedy_match(&vectors, &reference_vectors);
        let recall = greedy_match(&reference_vectors, &vectors);
        tracing::debug!(
            candidate_sentences = split,
            reference_sentences = reference_vectors.len(),
            precision,
            recall,
            "semantic score computed"
        );

        Ok(f_measure(precision.max(0.0), recall.max(0.0)))
    }

    fn name(&self) -> &str {
        self.embedder.model()
    }
}
