//! Batch stages over a document corpus
//!
//! Each stage takes explicit inputs and returns its outputs plus the
//! documents it had to skip. A failing document never stops the batch.

use std::path::{Path, PathBuf};

use docsum_core::{Document, PipelineEvent, ProgressSink, Summary, SummaryMethod};
use docsum_eval::{EvaluationScore, Evaluator, ReferenceSummaries};
use docsum_parser::{Chunker, DocumentLoader};
use docsum_summarize::Summarizer;
use docsum_vector::VectorIndex;
use serde::{Deserialize, Serialize};

/// A document left out of a stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedDocument {
    pub path: String,
    pub stage: &'static str,
    pub reason: String,
}

/// A loaded document and the file it came from
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub document: Document,
}

/// A summary keyed by its source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub path: PathBuf,
    pub summary: Summary,
}

/// Scores for one summarized document
#[derive(Debug, Clone, Serialize)]
pub struct DocumentEvaluation {
    pub path: PathBuf,
    pub document_id: String,
    pub score: EvaluationScore,
}

/// Outcome of a batch run
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub loaded: usize,
    pub indexed: usize,
    pub summaries: Vec<DocumentSummary>,
    pub evaluations: Vec<DocumentEvaluation>,
    pub skipped: Vec<SkippedDocument>,
}

impl RunReport {
    /// Mean of every score across evaluated documents
    pub fn mean_score(&self) -> Option<EvaluationScore> {
        if self.evaluations.is_empty() {
            return None;
        }
        let n = self.evaluations.len() as f32;
        let mut mean = EvaluationScore::default();
        for eval in &self.evaluations {
            let s = &eval.score;
            for (acc, value) in [
                (&mut mean.rouge1, &s.rouge1),
                (&mut mean.rouge2, &s.rouge2),
                (&mut mean.rouge_l, &s.rouge_l),
            ] {
                acc.precision += value.precision / n;
                acc.recall += value.recall / n;
                acc.fmeasure += value.fmeasure / n;
            }
            mean.bert_score += s.bert_score / n;
        }
        Some(mean)
    }
}

fn skip(
    progress: &dyn ProgressSink,
    path: &Path,
    stage: &'static str,
    reason: impl ToString,
) -> SkippedDocument {
    let skipped = SkippedDocument {
        path: path.display().to_string(),
        stage,
        reason: reason.to_string(),
    };
    tracing::warn!(path = %skipped.path, stage, reason = %skipped.reason, "document skipped");
    progress.on_event(&PipelineEvent::DocumentSkipped {
        path: skipped.path.clone(),
        reason: skipped.reason.clone(),
    });
    skipped
}

/// Load every path, skipping files that fail to parse or contain no text
pub fn load_documents(
    loader: &DocumentLoader,
    paths: &[PathBuf],
    progress: &dyn ProgressSink,
) -> (Vec<LoadedDocument>, Vec<SkippedDocument>) {
    let mut loaded = Vec::new();
    let mut skipped = Vec::new();

    for path in paths {
        match loader.load(path) {
            Ok(document) if document.text.trim().is_empty() => {
                skipped.push(skip(progress, path, "load", "no extractable text"));
            }
            Ok(document) => {
                progress.on_event(&PipelineEvent::DocumentLoaded {
                    id: document.id.clone(),
                    chars: document.char_count(),
                });
                loaded.push(LoadedDocument {
                    path: path.clone(),
                    document,
                });
            }
            Err(e) => skipped.push(skip(progress, path, "load", e)),
        }
    }

    tracing::info!(loaded = loaded.len(), skipped = skipped.len(), "corpus loaded");
    (loaded, skipped)
}

/// Add documents to `collection` one at a time so one bad document is skipped alone
pub async fn index_documents(
    index: &VectorIndex,
    collection: &str,
    documents: &[LoadedDocument],
    progress: &dyn ProgressSink,
) -> (usize, Vec<SkippedDocument>) {
    let mut indexed = 0;
    let mut skipped = Vec::new();

    for loaded in documents {
        match index.add(collection, std::slice::from_ref(&loaded.document)).await {
            Ok(count) => indexed += count,
            Err(e) => skipped.push(skip(progress, &loaded.path, "index", e)),
        }
    }

    progress.on_event(&PipelineEvent::DocumentsIndexed {
        collection: collection.to_string(),
        count: indexed,
    });
    tracing::info!(collection = %collection, vectors = indexed, skipped = skipped.len(), "documents indexed");
    (indexed, skipped)
}

/// Summarize each document in turn
pub async fn summarize_documents(
    summarizer: &Summarizer,
    chunker: &Chunker,
    documents: &[LoadedDocument],
    method: SummaryMethod,
    progress: &dyn ProgressSink,
) -> (Vec<DocumentSummary>, Vec<SkippedDocument>) {
    let mut summaries = Vec::new();
    let mut skipped = Vec::new();

    for loaded in documents {
        match summarizer
            .summarize_document(&loaded.document, chunker, method)
            .await
        {
            Ok(summary) => summaries.push(DocumentSummary {
                path: loaded.path.clone(),
                summary,
            }),
            Err(e) => skipped.push(skip(progress, &loaded.path, "summarize", e)),
        }
    }

    (summaries, skipped)
}

/// Score summaries that have a reference; the rest are skipped
pub async fn evaluate_summaries(
    evaluator: &Evaluator,
    summaries: &[DocumentSummary],
    references: &ReferenceSummaries,
    progress: &dyn ProgressSink,
) -> (Vec<DocumentEvaluation>, Vec<SkippedDocument>) {
    let mut evaluations = Vec::new();
    let mut skipped = Vec::new();

    for item in summaries {
        let Some(reference) = references.get(&item.path) else {
            skipped.push(skip(progress, &item.path, "evaluate", "no reference summary"));
            continue;
        };
        match evaluator.evaluate(&item.summary.text, reference).await {
            Ok(score) => {
                progress.on_event(&PipelineEvent::EvaluationCompleted {
                    document_id: item.summary.source_document_id.clone(),
                });
                evaluations.push(DocumentEvaluation {
                    path: item.path.clone(),
                    document_id: item.summary.source_document_id.clone(),
                    score,
                });
            }
            Err(e) => skipped.push(skip(progress, &item.path, "evaluate", e)),
        }
    }

    (evaluations, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docsum_core::{LlmClient, NoopProgress, Prompt, Result};
    use docsum_parser::ChunkConfig;
    use docsum_summarize::SummarizerConfig;
    use futures::stream::{self, BoxStream, StreamExt};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct FirstWordsLlm;

    #[async_trait]
    impl LlmClient for FirstWordsLlm {
        async fn generate(&self, prompt: &Prompt) -> Result<String> {
            let body = prompt.user.split("<context>\n").nth(1).unwrap_or("");
            Ok(body.split_whitespace().take(6).collect::<Vec<_>>().join(" "))
        }

        async fn generate_stream(&self, prompt: &Prompt) -> Result<BoxStream<'static, Result<String>>> {
            let text = self.generate(prompt).await?;
            Ok(stream::iter(vec![Ok(text)]).boxed())
        }

        fn model(&self) -> &str {
            "first-words"
        }
    }

    fn corpus() -> (TempDir, Vec<PathBuf>) {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("alpha.txt");
        std::fs::write(&good, "Alpha documents describe vaccine trials. They report results.").unwrap();
        let blank = dir.path().join("blank.txt");
        std::fs::write(&blank, "   \n").unwrap();
        let broken = dir.path().join("broken.txt");
        std::fs::write(&broken, [0xff, 0xfe, 0x00, 0xc3]).unwrap();
        let other = dir.path().join("beta.md");
        std::fs::write(&other, "Beta notes cover protein folding in detail.").unwrap();

        let paths = vec![good, blank, broken, other];
        (dir, paths)
    }

    #[test]
    fn test_load_skips_bad_documents_and_continues() {
        let (dir, paths) = corpus();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = events.clone();
            move |e: &PipelineEvent| events.lock().unwrap().push(e.clone())
        };

        let loader = DocumentLoader::new().with_root(dir.path());
        let (loaded, skipped) = load_documents(&loader, &paths, &sink);

        let ids: Vec<_> = loaded.iter().map(|l| l.document.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha.txt", "beta.md"]);
        assert_eq!(skipped.len(), 2);
        assert!(skipped.iter().all(|s| s.stage == "load"));
        assert!(skipped[0].path.ends_with("blank.txt"));
        assert!(skipped[1].path.ends_with("broken.txt"));

        let events = events.lock().unwrap();
        let skip_events = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::DocumentSkipped { .. }))
            .count();
        assert_eq!(skip_events, 2);
    }

    #[tokio::test]
    async fn test_summarize_and_evaluate_batch() {
        let (dir, paths) = corpus();
        let loader = DocumentLoader::new().with_root(dir.path());
        let (loaded, _) = load_documents(&loader, &paths, &NoopProgress);

        let summarizer = Summarizer::new(Arc::new(FirstWordsLlm), SummarizerConfig::default());
        let chunker = Chunker::new(ChunkConfig::new(40, 5).unwrap()).unwrap();
        let (summaries, skipped) =
            summarize_documents(&summarizer, &chunker, &loaded, SummaryMethod::Refine, &NoopProgress)
                .await;
        assert_eq!(summaries.len(), 2);
        assert!(skipped.is_empty());
        assert!(summaries.iter().all(|s| !s.summary.text.is_empty()));

        let references = ReferenceSummaries::from_json(
            r#"{"alpha.txt": "Alpha documents describe vaccine trials."}"#,
        )
        .unwrap();
        let evaluator = Evaluator::new(true).unwrap();
        let (evaluations, skipped) =
            evaluate_summaries(&evaluator, &summaries, &references, &NoopProgress).await;

        assert_eq!(evaluations.len(), 1);
        assert_eq!(evaluations[0].document_id, "alpha.txt");
        assert!(evaluations[0].score.rouge1.fmeasure > 0.0);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].stage, "evaluate");

        let report = RunReport {
            evaluations,
            ..RunReport::default()
        };
        let mean = report.mean_score().unwrap();
        assert_eq!(mean.rouge1, report.evaluations[0].score.rouge1);
        assert!(RunReport::default().mean_score().is_none());
    }
}
