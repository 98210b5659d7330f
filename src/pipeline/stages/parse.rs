use crate::generation::{GenerationRequest, GenerationTask};
use crate::pipeline::artifacts::{self, PageRecord};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::{StageError, StageErrorKind, StageResultExt};
use crate::pipeline::prompts;
use crate::pipeline::stage::{Probe, Stage, StageName};
use crate::pipeline::state::{ParseOutput, PipelineState};
use crate::registry::DocType;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use std::path::PathBuf;
use tokio::sync::Semaphore;

const NAME: StageName = StageName::Parse;

/// Rasterizes the source and extracts each page's content.
pub struct ParseStage;

#[async_trait]
impl Stage for ParseStage {
    fn name(&self) -> StageName {
        NAME
    }

    async fn probe(&self, ctx: &PipelineContext, state: &mut PipelineState) -> Probe {
        let path = ctx.layout.data_file(state.doc_name());
        match artifacts::read_json::<Vec<PageRecord>>(&path).await {
            Some(mut pages) if !pages.is_empty() => {
                pages.sort_by_key(|page| page.page);
                state.parse = Some(ParseOutput { pages });
                Probe::Hit {
                    cached_files: vec![path],
                }
            }
            _ => Probe::Miss,
        }
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        state: &mut PipelineState,
    ) -> Result<Vec<PathBuf>, StageError> {
        let input = &state.input;
        if input.doc_type == DocType::Url {
            return Err(StageError::new(
                NAME,
                StageErrorKind::Unsupported,
                format!("cannot ingest {}: URL documents are not supported", input.doc_path.display()),
            ));
        }
        if !tokio::fs::try_exists(&input.doc_path).await.unwrap_or(false) {
            return Err(StageError::new(
                NAME,
                StageErrorKind::InvalidInput,
                format!("source document {} does not exist", input.doc_path.display()),
            ));
        }

        let image_dir = ctx.layout.image_dir(&input.doc_name);
        let images = ctx
            .bounded(
                NAME,
                StageErrorKind::Rasterize,
                ctx.rasterizer.rasterize(&input.doc_path, &image_dir),
            )
            .await?;
        tracing::info!(doc_name = %input.doc_name, pages = images.len(), "Extracting page content");

        let semaphore = Semaphore::new(ctx.settings.page_concurrency.max(1));
        let doc_name = input.doc_name.as_str();
        let extractions = images.into_iter().enumerate().map(|(idx, image)| {
            let semaphore = &semaphore;
            async move {
                let page = u32::try_from(idx + 1).unwrap_or(u32::MAX);
                let _permit = semaphore
                    .acquire()
                    .await
                    .stage_err(NAME, StageErrorKind::Generation)?;
                let request = GenerationRequest::with_image(
                    GenerationTask::PageExtraction,
                    prompts::page_extraction(doc_name, page),
                    image.clone(),
                );
                let content = ctx.generate(NAME, request).await?;
                Ok::<_, StageError>(PageRecord {
                    page,
                    content: content.trim().to_string(),
                    image: Some(image),
                })
            }
        });
        let pages = try_join_all(extractions).await?;

        let data_file = ctx.layout.data_file(doc_name);
        artifacts::write_json(&data_file, &pages)
            .await
            .stage_err(NAME, StageErrorKind::Io)?;
        state.parse = Some(ParseOutput { pages });
        Ok(vec![data_file, image_dir])
    }
}
