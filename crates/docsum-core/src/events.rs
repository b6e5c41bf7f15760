//! Structured progress events
//!
//! Pipeline stages report progress through a [`ProgressSink`] rather than
//! printing. Callers decide how to present events (progress bars, logs, or
//! nothing at all).

use crate::SummaryMethod;
use serde::Serialize;

/// Progress event emitted by a pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A document was loaded from disk
    DocumentLoaded { id: String, chars: usize },

    /// A document could not be loaded or processed and was skipped
    DocumentSkipped { path: String, reason: String },

    /// A batch of documents was written to a collection
    DocumentsIndexed { collection: String, count: usize },

    /// One map call finished
    ChunkSummarized {
        document_id: String,
        index: usize,
        total: usize,
    },

    /// The reduce stage collapsed partial summaries into fewer groups
    CollapseRound {
        document_id: String,
        round: usize,
        groups: usize,
    },

    /// One refine step finished
    RefineStep {
        document_id: String,
        step: usize,
        total: usize,
    },

    /// A summary was produced
    SummaryCompleted {
        document_id: String,
        method: SummaryMethod,
        chars: usize,
    },

    /// A summary was scored against its reference
    EvaluationCompleted { document_id: String },
}

/// Receiver for pipeline progress events
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    fn on_event(&self, event: &PipelineEvent) {
        self(event)
    }
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Sink that forwards events to `tracing` at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::DocumentSkipped { path, reason } => {
                tracing::warn!(path = %path, reason = %reason, "document skipped");
            }
            other => tracing::debug!(event = ?other, "pipeline progress"),
        }
    }
}
