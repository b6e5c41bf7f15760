//! docsum Summarize - Multi-stage document summarization
//!
//! Two strategies over a document's ordered chunks:
//! - **Map-reduce**: every chunk is summarized independently (with bounded
//!   concurrency), partial summaries are collapsed in rounds while they are
//!   too long to combine, and one final call merges them.
//! - **Refine**: a running summary is folded over the chunks in order, one
//!   call per chunk.
//!
//! Both produce exactly one [`Summary`] per invocation or a single error
//! tagged with the failing [`SummaryStage`]. No call is retried.

use std::sync::Arc;
use std::time::Duration;

use docsum_core::{
    Chunk, DocsumError, Document, LlmClient, NoopProgress, PipelineEvent, ProgressSink, Prompt,
    Result, Summary, SummaryMethod, SummaryStage, SummarizerSettings,
};
use docsum_parser::Chunker;
use futures::stream::{self, StreamExt, TryStreamExt};

pub mod llm;
pub mod prompt;

pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use prompt::{PromptBuilder, SummaryPrompts};

// ============================================================================
// Configuration
// ============================================================================

/// Summarizer tuning
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Map calls in flight at once
    pub map_concurrency: usize,

    /// Combined partial-summary length (characters) above which a collapse round runs
    pub reduce_threshold: usize,

    /// Upper bound on collapse rounds before the final combine
    pub max_collapse_rounds: usize,

    /// Upper bound on each model call
    pub generation_timeout: Duration,

    /// Collect streamed output instead of one blocking response
    pub stream: bool,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self::from(&SummarizerSettings::default())
    }
}

impl From<&SummarizerSettings> for SummarizerConfig {
    fn from(settings: &SummarizerSettings) -> Self {
        Self {
            map_concurrency: settings.map_concurrency.max(1),
            reduce_threshold: settings.reduce_threshold,
            max_collapse_rounds: settings.max_collapse_rounds,
            generation_timeout: Duration::from_secs(settings.timeout_secs),
            stream: settings.stream,
        }
    }
}

fn at(stage: SummaryStage) -> impl FnOnce(DocsumError) -> DocsumError {
    move |source| DocsumError::Summarization {
        stage,
        source: Box::new(source),
    }
}

/// Greedily pack texts, in order, into groups whose joined length stays
/// within `limit` characters. A text longer than `limit` forms its own group.
fn pack(texts: Vec<String>, limit: usize) -> Vec<Vec<String>> {
    let mut groups = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;

    for text in texts {
        let len = text.chars().count();
        if !current.is_empty() && current_len + len > limit {
            groups.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current_len += len;
        current.push(text);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn total_chars(texts: &[String]) -> usize {
    texts.iter().map(|t| t.chars().count()).sum()
}

// ============================================================================
// Summarizer
// ============================================================================

/// Summarizes chunked documents through an LLM
pub struct Summarizer {
    llm: Arc<dyn LlmClient>,
    config: SummarizerConfig,
    prompts: SummaryPrompts,
    progress: Arc<dyn ProgressSink>,
}

impl Summarizer {
    /// Create a summarizer
    pub fn new(llm: Arc<dyn LlmClient>, config: SummarizerConfig) -> Self {
        Self {
            llm,
            config,
            prompts: SummaryPrompts::default(),
            progress: Arc::new(NoopProgress),
        }
    }

    /// Report progress events to `sink`
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    /// Chunk `document` and summarize it with `method`
    pub async fn summarize_document(
        &self,
        document: &Document,
        chunker: &Chunker,
        method: SummaryMethod,
    ) -> Result<Summary> {
        let chunks = chunker.chunk_document(document);
        self.summarize(&document.id, &chunks, method).await
    }

    /// Summarize pre-cut chunks of one document
    pub async fn summarize(
        &self,
        document_id: &str,
        chunks: &[Chunk],
        method: SummaryMethod,
    ) -> Result<Summary> {
        match method {
            SummaryMethod::MapReduce => self.map_reduce(document_id, chunks).await,
            SummaryMethod::Refine => self.refine(document_id, chunks).await,
        }
    }

    /// Map every chunk, collapse partials while too long, then combine once
    pub async fn map_reduce(&self, document_id: &str, chunks: &[Chunk]) -> Result<Summary> {
        if chunks.is_empty() {
            return Err(DocsumError::EmptyDocument(document_id.to_string()));
        }

        let total = chunks.len();
        tracing::info!(
            document_id = %document_id,
            chunks = total,
            concurrency = self.config.map_concurrency,
            model = %self.llm.model(),
            "map-reduce started"
        );

        let mut partials: Vec<String> = stream::iter(chunks.iter().enumerate())
            .map(|(index, chunk)| async move {
                let partial = self.generate(&self.prompts.chunk(&chunk.text)).await?;
                self.progress.on_event(&PipelineEvent::ChunkSummarized {
                    document_id: document_id.to_string(),
                    index,
                    total,
                });
                Ok::<_, DocsumError>(partial)
            })
            .buffered(self.config.map_concurrency)
            .try_collect()
            .await
            .map_err(at(SummaryStage::Map))?;

        let mut round = 0;
        while partials.len() > 1 && total_chars(&partials) > self.config.reduce_threshold {
            if round == self.config.max_collapse_rounds {
                tracing::warn!(
                    document_id = %document_id,
                    rounds = round,
                    chars = total_chars(&partials),
                    "collapse round limit reached, combining anyway"
                );
                break;
            }
            round += 1;

            let groups = pack(partials, self.config.reduce_threshold);
            let group_count = groups.len();
            partials = stream::iter(groups)
                .map(|group| async move { self.generate(&self.prompts.combine(&group)).await })
                .buffered(self.config.map_concurrency)
                .try_collect()
                .await
                .map_err(at(SummaryStage::Collapse))?;

            tracing::debug!(document_id = %document_id, round, groups = group_count, "collapse round finished");
            self.progress.on_event(&PipelineEvent::CollapseRound {
                document_id: document_id.to_string(),
                round,
                groups: group_count,
            });
        }

        let text = self
            .generate(&self.prompts.combine(&partials))
            .await
            .map_err(at(SummaryStage::Reduce))?;

        Ok(self.finish(document_id, text, SummaryMethod::MapReduce))
    }

    /// Fold a running summary over the chunks in order
    pub async fn refine(&self, document_id: &str, chunks: &[Chunk]) -> Result<Summary> {
        let Some((first, rest)) = chunks.split_first() else {
            return Err(DocsumError::EmptyDocument(document_id.to_string()));
        };

        let total = chunks.len();
        tracing::info!(document_id = %document_id, chunks = total, model = %self.llm.model(), "refine started");

        let mut summary = self
            .generate(&self.prompts.chunk(&first.text))
            .await
            .map_err(at(SummaryStage::Refine))?;
        self.progress.on_event(&PipelineEvent::RefineStep {
            document_id: document_id.to_string(),
            step: 1,
            total,
        });

        for (i, chunk) in rest.iter().enumerate() {
            summary = self
                .generate(&self.prompts.refine(&summary, &chunk.text))
                .await
                .map_err(at(SummaryStage::Refine))?;
            self.progress.on_event(&PipelineEvent::RefineStep {
                document_id: document_id.to_string(),
                step: i + 2,
                total,
            });
        }

        Ok(self.finish(document_id, summary, SummaryMethod::Refine))
    }

    fn finish(&self, document_id: &str, text: String, method: SummaryMethod) -> Summary {
        let summary = Summary::new(document_id, text, method);
        let chars = summary.text.chars().count();
        tracing::info!(document_id = %document_id, %method, chars, "summary completed");
        self.progress.on_event(&PipelineEvent::SummaryCompleted {
            document_id: document_id.to_string(),
            method,
            chars,
        });
        summary
    }

    /// One bounded model call; empty output is an error
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let call = async {
            if self.config.stream {
                let mut pieces = self.llm.generate_stream(prompt).await?;
                let mut text = String::new();
                while let Some(piece) = pieces.next().await {
                    text.push_str(&piece?);
                }
                Ok::<_, DocsumError>(text)
            } else {
                self.llm.generate(prompt).await
            }
        };

        let timeout = self.config.generation_timeout;
        let text = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| DocsumError::GenerationTimeout(timeout.as_secs()))??;

        let text = text.trim();
        if text.is_empty() {
            return Err(DocsumError::Generation(format!(
                "model {} returned an empty response",
                self.llm.model()
            )));
        }
        Ok(text.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docsum_parser::ChunkConfig;
    use futures::stream::BoxStream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Echoes back a short digest of the prompt's first context line
    #[derive(Default)]
    struct DigestLlm {
        calls: AtomicUsize,
        prompts: Mutex<Vec<Prompt>>,
        fail_on_call: Option<usize>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl DigestLlm {
        fn failing_on(call: usize) -> Self {
            Self {
                fail_on_call: Some(call),
                ..Self::default()
            }
        }

        fn digest(prompt: &Prompt) -> String {
            let body = prompt
                .user
                .split("<context>\n")
                .nth(1)
                .unwrap_or(prompt.user.as_str());
            let words: Vec<&str> = body.split_whitespace().take(4).collect();
            format!("summary: {}", words.join(" "))
        }
    }

    #[async_trait]
    impl LlmClient for DigestLlm {
        async fn generate(&self, prompt: &Prompt) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.clone());

            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on_call == Some(call) {
                return Err(DocsumError::Generation("service unavailable".to_string()));
            }
            Ok(Self::digest(prompt))
        }

        async fn generate_stream(&self, prompt: &Prompt) -> Result<BoxStream<'static, Result<String>>> {
            let text = self.generate(prompt).await?;
            let pieces: Vec<Result<String>> = text
                .split_inclusive(' ')
                .map(|piece| Ok(piece.to_string()))
                .collect();
            Ok(stream::iter(pieces).boxed())
        }

        fn model(&self) -> &str {
            "digest"
        }
    }

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn generate(&self, _prompt: &Prompt) -> Result<String> {
            Ok(self.0.to_string())
        }

        async fn generate_stream(&self, _prompt: &Prompt) -> Result<BoxStream<'static, Result<String>>> {
            Ok(stream::iter(vec![Ok(self.0.to_string())]).boxed())
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    struct SlowLlm;

    #[async_trait]
    impl LlmClient for SlowLlm {
        async fn generate(&self, _prompt: &Prompt) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }

        async fn generate_stream(&self, _prompt: &Prompt) -> Result<BoxStream<'static, Result<String>>> {
            futures::future::pending().await
        }

        fn model(&self) -> &str {
            "slow"
        }
    }

    fn chunks_of(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
        let chunker = Chunker::new(ChunkConfig::new(size, overlap).unwrap()).unwrap();
        chunker.chunk_document(&Document::new("doc", text))
    }

    fn source_text() -> String {
        (0..40)
            .map(|i| format!("Sentence number {i} describes messenger RNA vaccine research in detail."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn config() -> SummarizerConfig {
        SummarizerConfig {
            map_concurrency: 3,
            reduce_threshold: 10_000,
            max_collapse_rounds: 3,
            generation_timeout: Duration::from_secs(5),
            stream: false,
        }
    }

    #[test]
    fn test_pack_respects_limit_and_order() {
        let texts: Vec<String> = ["aaaa", "bbb", "cc", "dddddddd", "e"].map(String::from).to_vec();
        let groups = pack(texts, 7);
        assert_eq!(
            groups,
            vec![
                vec!["aaaa".to_string(), "bbb".to_string()],
                vec!["cc".to_string()],
                vec!["dddddddd".to_string()],
                vec!["e".to_string()],
            ]
        );
    }

    #[test]
    fn test_config_from_settings() {
        let settings = SummarizerSettings {
            map_concurrency: 0,
            timeout_secs: 9,
            ..SummarizerSettings::default()
        };
        let config = SummarizerConfig::from(&settings);
        assert_eq!(config.map_concurrency, 1);
        assert_eq!(config.generation_timeout, Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_map_reduce_produces_one_short_summary() {
        let text = source_text();
        let chunks = chunks_of(&text, 400, 40);
        assert!(chunks.len() > 3);

        let llm = Arc::new(DigestLlm::default());
        let summarizer = Summarizer::new(llm.clone(), config());
        let summary = summarizer.map_reduce("doc", &chunks).await.unwrap();

        assert!(!summary.text.is_empty());
        assert!(summary.text.chars().count() < text.chars().count());
        assert_eq!(summary.method, SummaryMethod::MapReduce);
        assert_eq!(summary.source_document_id, "doc");
        // one call per chunk plus the final combine
        assert_eq!(llm.calls.load(Ordering::SeqCst), chunks.len() + 1);
        assert!(llm.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_map_reduce_collapses_long_partials() {
        let chunks = chunks_of(&source_text(), 200, 20);
        let llm = Arc::new(DigestLlm::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = events.clone();
            move |event: &PipelineEvent| events.lock().unwrap().push(event.clone())
        };

        let summarizer = Summarizer::new(
            llm.clone(),
            SummarizerConfig {
                reduce_threshold: 100,
                ..config()
            },
        )
        .with_progress(Arc::new(sink));
        let summary = summarizer.map_reduce("doc", &chunks).await.unwrap();
        assert!(!summary.text.is_empty());

        let events = events.lock().unwrap();
        let rounds = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::CollapseRound { .. }))
            .count();
        assert!(rounds >= 1);
        assert!(rounds <= 3);
        let mapped = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::ChunkSummarized { .. }))
            .count();
        assert_eq!(mapped, chunks.len());
        assert!(matches!(events.last(), Some(PipelineEvent::SummaryCompleted { .. })));
    }

    #[tokio::test]
    async fn test_map_failure_aborts_with_stage() {
        let chunks = chunks_of(&source_text(), 400, 40);
        let summarizer = Summarizer::new(Arc::new(DigestLlm::failing_on(1)), config());

        let err = summarizer.map_reduce("doc", &chunks).await.unwrap_err();
        match err {
            DocsumError::Summarization { stage, source } => {
                assert_eq!(stage, SummaryStage::Map);
                assert!(matches!(*source, DocsumError::Generation(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_reduce_failure_reports_reduce_stage() {
        let chunks = chunks_of("short text. another short sentence here.", 20, 4);
        let n = chunks.len();
        let summarizer = Summarizer::new(Arc::new(DigestLlm::failing_on(n)), config());

        let err = summarizer.map_reduce("doc", &chunks).await.unwrap_err();
        assert!(matches!(err, DocsumError::Summarization { stage: SummaryStage::Reduce, .. }));
    }

    #[tokio::test]
    async fn test_refine_is_sequential_and_ordered() {
        let chunks = chunks_of(&source_text(), 400, 40);
        let llm = Arc::new(DigestLlm::default());
        let summarizer = Summarizer::new(llm.clone(), config());

        let summary = summarizer.refine("doc", &chunks).await.unwrap();
        assert_eq!(summary.method, SummaryMethod::Refine);
        assert!(summary.text.chars().count() < source_text().chars().count());

        assert_eq!(llm.calls.load(Ordering::SeqCst), chunks.len());
        assert_eq!(llm.max_in_flight.load(Ordering::SeqCst), 1);

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].user.contains(chunks[0].text.trim()));
        for (prompt, chunk) in prompts.iter().zip(&chunks).skip(1) {
            assert!(prompt.user.contains("Existing summary:\nsummary:"));
            assert!(prompt.user.contains(chunk.text.trim()));
        }
    }

    #[tokio::test]
    async fn test_refine_failure_reports_refine_stage() {
        let chunks = chunks_of(&source_text(), 400, 40);
        let summarizer = Summarizer::new(Arc::new(DigestLlm::failing_on(2)), config());
        let err = summarizer.refine("doc", &chunks).await.unwrap_err();
        assert!(matches!(err, DocsumError::Summarization { stage: SummaryStage::Refine, .. }));
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let summarizer = Summarizer::new(Arc::new(DigestLlm::default()), config());
        assert!(matches!(
            summarizer.map_reduce("empty", &[]).await,
            Err(DocsumError::EmptyDocument(id)) if id == "empty"
        ));
        assert!(matches!(
            summarizer.refine("empty", &[]).await,
            Err(DocsumError::EmptyDocument(_))
        ));

        let chunker = Chunker::new(ChunkConfig::new(10, 2).unwrap()).unwrap();
        assert!(matches!(
            summarizer
                .summarize_document(&Document::new("blank", ""), &chunker, SummaryMethod::Refine)
                .await,
            Err(DocsumError::EmptyDocument(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_model_response_is_generation_error() {
        let chunks = chunks_of("some text", 100, 10);
        let summarizer = Summarizer::new(Arc::new(FixedLlm("   ")), config());
        let err = summarizer.refine("doc", &chunks).await.unwrap_err();
        match err {
            DocsumError::Summarization { source, .. } => {
                assert!(matches!(*source, DocsumError::Generation(_)))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_generation_timeout() {
        let chunks = chunks_of("some text", 100, 10);
        let summarizer = Summarizer::new(
            Arc::new(SlowLlm),
            SummarizerConfig {
                generation_timeout: Duration::from_millis(20),
                ..config()
            },
        );

        let err = summarizer.map_reduce("doc", &chunks).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(
            err,
            DocsumError::Summarization { stage: SummaryStage::Map, ref source }
                if matches!(**source, DocsumError::GenerationTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_streaming_collects_pieces() {
        let chunks = chunks_of(&source_text(), 400, 40);
        let llm = Arc::new(DigestLlm::default());
        let streaming = Summarizer::new(
            llm.clone(),
            SummarizerConfig {
                stream: true,
                ..config()
            },
        );
        let blocking = Summarizer::new(Arc::new(DigestLlm::default()), config());

        let streamed = streaming.summarize("doc", &chunks, SummaryMethod::MapReduce).await.unwrap();
        let direct = blocking.summarize("doc", &chunks, SummaryMethod::MapReduce).await.unwrap();
        assert_eq!(streamed.text, direct.text);
    }
}
