//! ROUGE metrics
//!
//! ROUGE-N counts clipped n-gram matches between candidate and reference
//! token sequences. ROUGE-L uses the longest common subsequence.

use std::collections::HashMap;

use docsum_core::{DocsumError, Result};
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};

/// Tokens of this many characters or fewer are left unstemmed
const MIN_STEM_LEN: usize = 3;

// ============================================================================
// Tokenizer
// ============================================================================

/// Lowercasing alphanumeric tokenizer with optional Snowball stemming
pub struct Tokenizer {
    separator: Regex,
    stemmer: Option<Stemmer>,
}

impl Tokenizer {
    pub fn new(use_stemmer: bool) -> Result<Self> {
        let separator = Regex::new(r"[^a-z0-9]+")
            .map_err(|e| DocsumError::Evaluation(format!("invalid token pattern: {e}")))?;
        Ok(Self {
            separator,
            stemmer: use_stemmer.then(|| Stemmer::create(Algorithm::English)),
        })
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.separator
            .split(&lowered)
            .filter(|token| !token.is_empty())
            .map(|token| match &self.stemmer {
                Some(stemmer) if token.chars().count() > MIN_STEM_LEN => {
                    stemmer.stem(token).into_owned()
                }
                _ => token.to_string(),
            })
            .collect()
    }
}

// ============================================================================
// Scores
// ============================================================================

/// Precision, recall and F-measure of one ROUGE variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RougeScore {
    pub precision: f32,
    pub recall: f32,
    pub fmeasure: f32,
}

/// Match counts behind a [`RougeScore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlapCounts {
    /// Matched units (clipped n-grams or LCS length)
    pub matched: usize,
    /// Units in the candidate
    pub candidate_total: usize,
    /// Units in the reference
    pub reference_total: usize,
}

impl OverlapCounts {
    /// matched / candidate_total
    pub fn precision(&self) -> f32 {
        if self.candidate_total == 0 {
            0.0
        } else {
            self.matched as f32 / self.candidate_total as f32
        }
    }

    /// matched / reference_total
    pub fn recall(&self) -> f32 {
        if self.reference_total == 0 {
            0.0
        } else {
            self.matched as f32 / self.reference_total as f32
        }
    }

    pub fn score(&self) -> RougeScore {
        let precision = self.precision();
        let recall = self.recall();
        RougeScore {
            precision,
            recall,
            fmeasure: f_measure(precision, recall),
        }
    }
}

/// Harmonic mean, 0 when both inputs are 0
pub fn f_measure(precision: f32, recall: f32) -> f32 {
    if precision + recall <= 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if n == 0 {
        return counts;
    }
    for gram in tokens.windows(n) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}

/// Clipped n-gram overlap between two token sequences
pub fn ngram_overlap(candidate: &[String], reference: &[String], n: usize) -> OverlapCounts {
    let candidate_counts = ngram_counts(candidate, n);
    let reference_counts = ngram_counts(reference, n);

    let matched = candidate_counts
        .iter()
        .map(|(gram, count)| reference_counts.get(gram).map_or(0, |r| (*count).min(*r)))
        .sum();

    OverlapCounts {
        matched,
        candidate_total: candidate_counts.values().sum(),
        reference_total: reference_counts.values().sum(),
    }
}

/// Longest common subsequence length
pub fn lcs_len(a: &[String], b: &[String]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

pub fn rouge_n(candidate: &[String], reference: &[String], n: usize) -> RougeScore {
    ngram_overlap(candidate, reference, n).score()
}

pub fn rouge_l(candidate: &[String], reference: &[String]) -> RougeScore {
    OverlapCounts {
        matched: lcs_len(candidate, reference),
        candidate_total: candidate.len(),
        reference_total: reference.len(),
    }
    .score()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        Tokenizer::new(false).unwrap().tokenize(text)
    }

    #[test]
    fn test_tokenizer_lowercases_and_splits() {
        assert_eq!(
            tokens("The mRNA-1273 vaccine, tested!"),
            vec!["the", "mrna", "1273", "vaccine", "tested"]
        );
        assert!(tokens("  ... !!").is_empty());
    }

    #[test]
    fn test_tokenizer_stems_long_tokens_only() {
        let tokenizer = Tokenizer::new(true).unwrap();
        assert_eq!(tokenizer.tokenize("running vaccines"), vec!["run", "vaccin"]);
        // three characters or fewer stay as written
        assert_eq!(tokenizer.tokenize("was"), vec!["was"]);
    }

    #[test]
    fn test_rouge1_counts() {
        let overlap = ngram_overlap(
            &tokens("the cat sat on the mat"),
            &tokens("the cat lay on the rug"),
            1,
        );
        assert_eq!(overlap.matched, 4);
        assert_eq!(overlap.candidate_total, 6);
        assert_eq!(overlap.reference_total, 6);
    }

    #[test]
    fn test_rouge_clips_repeated_ngrams() {
        let overlap = ngram_overlap(&tokens("the the the"), &tokens("the cat"), 1);
        assert_eq!(overlap.matched, 1);
        assert!((overlap.precision() - 1.0 / 3.0).abs() < 1e-6);
        assert!((overlap.recall() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rouge2() {
        let score = rouge_n(&tokens("a b c d"), &tokens("a b x c d"), 2);
        // shared bigrams: "a b", "c d"
        assert!((score.precision - 2.0 / 3.0).abs() < 1e-6);
        assert!((score.recall - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_identical_texts_score_one() {
        let t = tokens("messenger rna vaccines encode the spike protein");
        for score in [rouge_n(&t, &t, 1), rouge_n(&t, &t, 2), rouge_l(&t, &t)] {
            assert!((score.fmeasure - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_lcs() {
        assert_eq!(lcs_len(&tokens("a b c d e"), &tokens("a c e")), 3);
        assert_eq!(lcs_len(&tokens("a b"), &tokens("c d")), 0);
        assert_eq!(lcs_len(&[], &tokens("a")), 0);

        let score = rouge_l(&tokens("police killed the gunman"), &tokens("police kill the gunman"));
        assert!((score.fmeasure - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_empty_sequences_are_zero() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(rouge_n(&empty, &tokens("a b"), 1), RougeScore::default());
        assert_eq!(rouge_l(&tokens("a b"), &empty), RougeScore::default());
        assert_eq!(f_measure(0.0, 0.0), 0.0);
    }
}
