use crate::pipeline::artifacts::{self, ChapterChunk};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::{StageError, StageErrorKind, StageResultExt};
use crate::pipeline::stage::{Probe, Stage, StageName};
use crate::pipeline::state::{ChunkOutput, PipelineState};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

const NAME: StageName = StageName::ChunkText;

/// Groups page text by chapter.
pub struct ChunkTextStage;

#[async_trait]
impl Stage for ChunkTextStage {
    fn name(&self) -> StageName {
        NAME
    }

    async fn probe(&self, ctx: &PipelineContext, state: &mut PipelineState) -> Probe {
        let path = ctx.layout.chunks_file(state.doc_name());
        match artifacts::read_json::<BTreeMap<String, ChapterChunk>>(&path).await {
            Some(chapters) if !chapters.is_empty() => {
                state.chunks = Some(ChunkOutput { chapters });
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
        let structure = state
            .structure
            .as_ref()
            .ok_or_else(|| StageError::missing_input(NAME, StageName::ExtractStructure))?;
        let pages = state.json_data_dict();
        if pages.is_empty() {
            return Err(StageError::missing_input(NAME, StageName::Parse));
        }

        let mut chapters = BTreeMap::new();
        for (title, chapter_pages) in &structure.agenda {
            let data: BTreeMap<u32, String> = chapter_pages
                .iter()
                .filter_map(|page| pages.get(page).map(|text| (*page, text.clone())))
                .collect();
            if data.is_empty() {
                tracing::warn!(doc_name = %state.doc_name(), chapter = %title, "Chapter has no extracted pages; dropping");
                continue;
            }
            let present = data.keys().copied().collect();
            chapters.insert(
                title.clone(),
                ChapterChunk {
                    data,
                    pages: present,
                },
            );
        }
        if chapters.is_empty() {
            return Err(StageError::new(
                NAME,
                StageErrorKind::InvalidInput,
                "no chapter in the agenda matched an extracted page",
            ));
        }

        let path = ctx.layout.chunks_file(state.doc_name());
        artifacts::write_json(&path, &chapters)
            .await
            .stage_err(NAME, StageErrorKind::Io)?;
        state.chunks = Some(ChunkOutput { chapters });
        Ok(vec![path])
    }
}
