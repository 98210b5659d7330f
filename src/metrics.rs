use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity across documents.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_completed: AtomicU64,
    documents_failed: AtomicU64,
    stages_executed: AtomicU64,
    stages_skipped: AtomicU64,
    stages_failed: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document whose run reached the terminal success state.
    pub fn record_document_completed(&self) {
        self.documents_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a document whose run halted on a stage failure.
    pub fn record_document_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stage that ran to completion.
    pub fn record_stage_executed(&self) {
        self.stages_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stage satisfied by an existing artifact.
    pub fn record_stage_skipped(&self) {
        self.stages_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stage that raised an error.
    pub fn record_stage_failed(&self) {
        self.stages_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_completed: self.documents_completed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            stages_executed: self.stages_executed.load(Ordering::Relaxed),
            stages_skipped: self.stages_skipped.load(Ordering::Relaxed),
            stages_failed: self.stages_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents that finished every stage.
    pub documents_completed: u64,
    /// Documents halted by a stage failure.
    pub documents_failed: u64,
    /// Stages that did real work.
    pub stages_executed: u64,
    /// Stages skipped thanks to a cached artifact.
    pub stages_skipped: u64,
    /// Stages that failed.
    pub stages_failed: u64,
}
