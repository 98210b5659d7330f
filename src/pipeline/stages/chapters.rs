use super::index::{TAG_RAW_DATA, TAG_REFACTOR, TAG_TITLE};
use crate::generation::{GenerationRequest, GenerationTask};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::{StageError, StageErrorKind, StageResultExt};
use crate::pipeline::prompts;
use crate::pipeline::stage::{Probe, Stage, StageName};
use crate::pipeline::state::{ChapterOutputs, PipelineState};
use crate::vector_store::RecordKind;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use std::path::PathBuf;
use tokio::sync::Semaphore;

const NAME: StageName = StageName::ProcessChapters;

/// Summarizes and rewrites every chapter.
///
/// Chapter outputs are not written to their own file; they live in the vector index, so a
/// populated index is what makes this stage skippable.
pub struct ProcessChaptersStage;

#[async_trait]
impl Stage for ProcessChaptersStage {
    fn name(&self) -> StageName {
        NAME
    }

    async fn probe(&self, ctx: &PipelineContext, state: &mut PipelineState) -> Probe {
        let index_path = ctx.layout.vector_dir(state.doc_name());
        if !ctx.vector_store.is_populated(&index_path).await {
            return Probe::Miss;
        }
        let scan = ctx.vector_store.scan_by_tag(&index_path, RecordKind::Context);
        let records = match ctx.bounded(NAME, StageErrorKind::VectorStore, scan).await {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(doc_name = %state.doc_name(), error = %error, "Vector index unreadable");
                return Probe::Miss;
            }
        };

        let mut outputs = ChapterOutputs::default();
        for record in &records {
            let Some(title) = record.tag(TAG_TITLE) else {
                continue;
            };
            outputs.summaries.insert(title.to_string(), record.page_content.clone());
            outputs.refactors.insert(
                title.to_string(),
                record.tag(TAG_REFACTOR).unwrap_or_default().to_string(),
            );
            outputs.raw_data.insert(
                title.to_string(),
                record.tag(TAG_RAW_DATA).unwrap_or_default().to_string(),
            );
        }
        if outputs.summaries.is_empty() {
            return Probe::Miss;
        }

        state.chapters = Some(outputs);
        Probe::Hit {
            cached_files: vec![index_path],
        }
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        state: &mut PipelineState,
    ) -> Result<Vec<PathBuf>, StageError> {
        let chunks = state
            .chunks
            .as_ref()
            .ok_or_else(|| StageError::missing_input(NAME, StageName::ChunkText))?;

        let semaphore = Semaphore::new(ctx.settings.chapter_concurrency.max(1));
        let jobs = chunks.chapters.iter().map(|(title, chunk)| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .stage_err(NAME, StageErrorKind::Generation)?;
                let text = chunk.text();
                let summary = GenerationRequest::text(
                    GenerationTask::ChapterSummary,
                    prompts::chapter_summary(title, &text),
                );
                let refactor = GenerationRequest::text(
                    GenerationTask::ChapterRefactor,
                    prompts::chapter_refactor(title, &text),
                );
                let (summary, refactor) =
                    tokio::try_join!(ctx.generate(NAME, summary), ctx.generate(NAME, refactor))?;
                tracing::debug!(chapter = %title, pages = chunk.pages.len(), "Chapter processed");
                Ok::<_, StageError>((title.clone(), summary, refactor, text))
            }
        });
        let processed = try_join_all(jobs).await?;

        let mut outputs = ChapterOutputs::default();
        for (title, summary, refactor, raw) in processed {
            outputs.summaries.insert(title.clone(), summary.trim().to_string());
            outputs.refactors.insert(title.clone(), refactor.trim().to_string());
            outputs.raw_data.insert(title, raw);
        }
        tracing::info!(doc_name = %state.doc_name(), chapters = outputs.summaries.len(), "Chapters processed");
        state.chapters = Some(outputs);
        Ok(Vec::new())
    }
}
