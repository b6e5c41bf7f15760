//! docsum Eval - Summary quality scoring
//!
//! Scores a generated summary against a reference with ROUGE-1, ROUGE-2,
//! ROUGE-L and an embedding-based semantic score. The scores are reported
//! side by side and never combined.

use std::sync::Arc;

use docsum_core::{EvaluationConfig, Result};
use serde::{Deserialize, Serialize};

pub mod bert;
pub mod references;
pub mod rouge;

pub use bert::{split_sentences, EmbeddingSemanticScorer, SemanticScorer};
pub use references::ReferenceSummaries;
pub use rouge::{lcs_len, ngram_overlap, rouge_l, rouge_n, OverlapCounts, RougeScore, Tokenizer};

/// Scores of one generated summary against its reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScore {
    pub rouge1: RougeScore,
    pub rouge2: RougeScore,
    #[serde(rename = "rougeL")]
    pub rouge_l: RougeScore,
    pub bert_score: f32,
}

impl EvaluationScore {
    /// F-measures of ROUGE-1, ROUGE-2 and ROUGE-L
    pub fn fmeasures(&self) -> [f32; 3] {
        [self.rouge1.fmeasure, self.rouge2.fmeasure, self.rouge_l.fmeasure]
    }
}

/// Summary evaluator
pub struct Evaluator {
    tokenizer: Tokenizer,
    scorer: Option<Arc<dyn SemanticScorer>>,
}

impl Evaluator {
    /// ROUGE only; `bert_score` stays 0.0
    pub fn new(use_stemmer: bool) -> Result<Self> {
        Ok(Self {
            tokenizer: Tokenizer::new(use_stemmer)?,
            scorer: None,
        })
    }

    pub fn from_config(config: &EvaluationConfig) -> Result<Self> {
        Self::new(config.use_stemmer)
    }

    pub fn with_semantic_scorer(mut self, scorer: Arc<dyn SemanticScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Score `generated` against `reference`
    ///
    /// An empty side (no tokens after normalization) yields all-zero scores
    /// and skips the semantic scorer.
    pub async fn evaluate(&self, generated: &str, reference: &str) -> Result<EvaluationScore> {
        let candidate = self.tokenizer.tokenize(generated);
        let target = self.tokenizer.tokenize(reference);
        if candidate.is_empty() || target.is_empty() {
            tracing::debug!(
                generated_tokens = candidate.len(),
                reference_tokens = target.len(),
                "empty evaluation input, scoring zero"
            );
            return Ok(EvaluationScore::default());
        }

        let bert_score = match &self.scorer {
            Some(scorer) => scorer.score(generated, reference).await?,
            None => 0.0,
        };

        let score = EvaluationScore {
            rouge1: rouge_n(&candidate, &target, 1),
            rouge2: rouge_n(&candidate, &target, 2),
            rouge_l: rouge_l(&candidate, &target),
            bert_score,
        };
        tracing::info!(
            rouge1 = score.rouge1.fmeasure,
            rouge2 = score.rouge2.fmeasure,
            rouge_l = score.rouge_l.fmeasure,
            bert_score,
            "summary evaluated"
        );
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bert::tests::LetterEmbedding;
    use std::sync::atomic::Ordering;

    const REFERENCE: &str = "Messenger RNA vaccines instruct cells to produce the spike protein. \
        The immune system then learns to recognise the virus.";

    fn evaluator_with(embedder: Arc<LetterEmbedding>) -> Evaluator {
        Evaluator::new(true)
            .unwrap()
            .with_semantic_scorer(Arc::new(EmbeddingSemanticScorer::new(embedder)))
    }

    #[tokio::test]
    async fn test_empty_inputs_score_zero_without_scorer_call() {
        let embedder = Arc::new(LetterEmbedding::default());
        let evaluator = evaluator_with(embedder.clone());

        let empty_generated = evaluator.evaluate("", REFERENCE).await.unwrap();
        let empty_reference = evaluator.evaluate(REFERENCE, "").await.unwrap();
        let punctuation_only = evaluator.evaluate("...", REFERENCE).await.unwrap();

        for score in [empty_generated, empty_reference, punctuation_only] {
            assert_eq!(score, EvaluationScore::default());
            assert_eq!(score.fmeasures(), [0.0; 3]);
            assert_eq!(score.bert_score, 0.0);
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_identical_summary_scores_perfectly() {
        let evaluator = evaluator_with(Arc::new(LetterEmbedding::default()));
        let score = evaluator.evaluate(REFERENCE, REFERENCE).await.unwrap();

        for f in score.fmeasures() {
            assert!((f - 1.0).abs() < 1e-6);
        }
        assert!((score.bert_score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_stemming_matches_inflections() {
        let stemmed = Evaluator::new(true).unwrap();
        let plain = Evaluator::new(false).unwrap();
        let generated = "vaccine trains cells";
        let reference = "vaccines training cell";

        let with = stemmed.evaluate(generated, reference).await.unwrap();
        let without = plain.evaluate(generated, reference).await.unwrap();
        assert!((with.rouge1.fmeasure - 1.0).abs() < 1e-6);
        assert_eq!(without.rouge1.fmeasure, 0.0);
        assert_eq!(with.bert_score, 0.0);
    }

    #[tokio::test]
    async fn test_partial_overlap_is_between_zero_and_one() {
        let evaluator = evaluator_with(Arc::new(LetterEmbedding::default()));
        let score = evaluator
            .evaluate("RNA vaccines make cells produce spike protein.", REFERENCE)
            .await
            .unwrap();

        for value in [score.rouge1.fmeasure, score.rouge2.fmeasure, score.rouge_l.fmeasure, score.bert_score] {
            assert!(value > 0.0 && value < 1.0, "score out of range: {value}");
        }
        assert!(score.rouge1.precision > score.rouge1.recall);
    }

    #[test]
    fn test_score_serializes_with_rouge_keys() {
        let json = serde_json::to_value(EvaluationScore::default()).unwrap();
        assert!(json.get("rouge1").is_some());
        assert!(json.get("rougeL").is_some());
        assert_eq!(json["rouge2"]["fmeasure"], 0.0);
    }
}
