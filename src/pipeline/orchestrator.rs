//! Drives one document through the stage list.

use super::context::PipelineContext;
use super::error::{StageError, StageErrorKind};
use super::stage::{Probe, Stage, StageName};
use super::stages::default_stages;
use super::state::{DocumentInput, PipelineState, RunStatus, SkipEntry};
use crate::registry::StageStatus;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Runs documents through an ordered stage list with artifact-level caching.
///
/// A run has two passes. The cache pass probes every cacheable stage in order, rehydrates the
/// state from each artifact it finds, and marks those stages completed in the registry. The
/// execution pass then runs every stage that was not skipped, halting at the first failure.
pub struct DocumentPipeline {
    ctx: Arc<PipelineContext>,
    stages: Vec<Box<dyn Stage>>,
}

impl DocumentPipeline {
    /// Pipeline with the standard stages.
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self::with_stages(ctx, default_stages())
    }

    /// Pipeline with a custom stage list.
    pub fn with_stages(ctx: Arc<PipelineContext>, stages: Vec<Box<dyn Stage>>) -> Self {
        Self { ctx, stages }
    }

    /// Shared context.
    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Process one document. Failures are reported in the returned state, never raised.
    pub async fn run(&self, input: DocumentInput) -> PipelineState {
        let started = Instant::now();
        let mut state = PipelineState::new(input);
        tracing::info!(doc_name = %state.doc_name(), "Pipeline started");

        self.check_cache(&mut state).await;
        state.status = RunStatus::Running;

        for stage in &self.stages {
            let name = stage.name();
            if state.is_skipped(name) {
                tracing::debug!(doc_name = %state.doc_name(), stage = name.as_str(), "Stage skipped");
                continue;
            }

            let stage_started = Instant::now();
            state.executed.push(name);
            let outcome = match stage.run(&self.ctx, &mut state).await {
                Ok(output_files) => self.record(&state, name, StageStatus::Completed, output_files),
                Err(error) => Err(error),
            };

            match outcome {
                Ok(()) => {
                    self.ctx.metrics.record_stage_executed();
                    tracing::info!(
                        doc_name = %state.doc_name(),
                        stage = name.as_str(),
                        elapsed_ms = stage_started.elapsed().as_millis() as u64,
                        "Stage completed"
                    );
                }
                Err(error) => {
                    self.ctx.metrics.record_stage_failed();
                    self.ctx.metrics.record_document_failed();
                    tracing::error!(
                        doc_name = %state.doc_name(),
                        stage = name.as_str(),
                        kind = %error.kind,
                        error = %error.message,
                        "Stage failed"
                    );
                    if let Err(record_error) = self.record(&state, name, StageStatus::Failed, Vec::new()) {
                        tracing::warn!(error = %record_error, "Could not record stage failure");
                    }
                    state.fail(error);
                    return state;
                }
            }
        }

        if state.status == RunStatus::Running {
            state.status = RunStatus::Completed;
            state.is_complete = true;
        }
        self.ctx.metrics.record_document_completed();
        tracing::info!(
            doc_name = %state.doc_name(),
            executed = state.executed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline finished"
        );
        state
    }

    /// Probe every cacheable stage in order and record the hits.
    ///
    /// Later probes may consult earlier decisions, so each entry is stored before the next
    /// stage is probed.
    async fn check_cache(&self, state: &mut PipelineState) {
        for stage in &self.stages {
            let name = stage.name();
            if !name.is_cacheable() {
                continue;
            }
            let entry = match stage.probe(&self.ctx, state).await {
                Probe::Hit { cached_files } => {
                    self.ctx.metrics.record_stage_skipped();
                    if let Err(error) =
                        self.record(state, name, StageStatus::Completed, cached_files.clone())
                    {
                        tracing::warn!(stage = name.as_str(), error = %error, "Could not record cached stage");
                    }
                    SkipEntry {
                        skip: true,
                        cached_files,
                    }
                }
                Probe::Miss => SkipEntry::default(),
            };
            state.skip_table.insert(name, entry);
        }

        let skipped: Vec<&str> = state
            .skip_table
            .iter()
            .filter(|(_, entry)| entry.skip)
            .map(|(name, _)| name.as_str())
            .collect();
        tracing::info!(doc_name = %state.doc_name(), skipped = ?skipped, "Cache check finished");
    }

    fn record(
        &self,
        state: &PipelineState,
        stage: StageName,
        status: StageStatus,
        output_files: Vec<PathBuf>,
    ) -> Result<(), StageError> {
        self.ctx
            .registry
            .update_source_stage_status(
                state.doc_name(),
                (&state.input.doc_path, state.input.doc_type),
                stage,
                status,
                output_files,
            )
            .map_err(|error| StageError::new(stage, StageErrorKind::Registry, error))
    }
}
