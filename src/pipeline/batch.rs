//! Bounded-concurrency execution of many documents.

use super::orchestrator::DocumentPipeline;
use super::state::{DocumentInput, PipelineState, RunStatus};
use futures_util::future::join_all;
use std::sync::Arc;

/// Result for one submitted document.
#[derive(Debug)]
pub enum DocumentOutcome {
    /// The pipeline returned; success or failure is in the state.
    Finished(Box<PipelineState>),
    /// The pipeline task itself died.
    Crashed {
        /// Document that was being processed.
        doc_name: String,
        /// Panic or cancellation message.
        message: String,
    },
}

impl DocumentOutcome {
    /// Document name.
    pub fn doc_name(&self) -> &str {
        match self {
            Self::Finished(state) => state.doc_name(),
            Self::Crashed { doc_name, .. } => doc_name,
        }
    }

    /// Run status; a crashed task counts as an error.
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Finished(state) => state.status,
            Self::Crashed { .. } => RunStatus::Error,
        }
    }

    /// Final state, when the pipeline returned.
    pub fn state(&self) -> Option<&PipelineState> {
        match self {
            Self::Finished(state) => Some(state),
            Self::Crashed { .. } => None,
        }
    }
}

/// Outcome of a batch, in submission order.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One outcome per submitted document.
    pub results: Vec<DocumentOutcome>,
    /// Documents that completed.
    pub succeeded: usize,
    /// Documents that failed or crashed.
    pub failed: usize,
}

/// Runs documents in consecutive groups of at most `max_concurrent`.
///
/// Each group is awaited in full before the next starts. A failing or panicking document
/// never affects its siblings.
pub struct BatchController {
    pipeline: Arc<DocumentPipeline>,
}

impl BatchController {
    /// Controller over `pipeline`.
    pub fn new(pipeline: Arc<DocumentPipeline>) -> Self {
        Self { pipeline }
    }

    /// Process every document and report per-document outcomes.
    pub async fn run_batch(&self, documents: Vec<DocumentInput>, max_concurrent: usize) -> BatchReport {
        let group_size = max_concurrent.max(1);
        let total = documents.len();
        let mut report = BatchReport::default();

        for (group_idx, group) in documents.chunks(group_size).enumerate() {
            tracing::info!(
                group = group_idx + 1,
                documents = group.len(),
                total,
                "Starting document group"
            );
            let handles: Vec<_> = group
                .iter()
                .cloned()
                .map(|input| {
                    let pipeline = Arc::clone(&self.pipeline);
                    let doc_name = input.doc_name.clone();
                    let handle = tokio::spawn(async move { pipeline.run(input).await });
                    (doc_name, handle)
                })
                .collect();

            let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
            for (doc_name, joined) in names.into_iter().zip(join_all(handles).await) {
                let outcome = match joined {
                    Ok(state) => DocumentOutcome::Finished(Box::new(state)),
                    Err(error) => {
                        tracing::error!(doc_name = %doc_name, error = %error, "Document task crashed");
                        self.pipeline.context().metrics.record_document_failed();
                        DocumentOutcome::Crashed {
                            doc_name,
                            message: error.to_string(),
                        }
                    }
                };
                if outcome.status() == RunStatus::Completed {
                    report.succeeded += 1;
                } else {
                    report.failed += 1;
                }
                report.results.push(outcome);
            }
        }

        tracing::info!(
            total,
            succeeded = report.succeeded,
            failed = report.failed,
            "Batch finished"
        );
        report
    }
}
