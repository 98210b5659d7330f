use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::{StageError, StageErrorKind};
use crate::pipeline::stage::{Probe, Stage, StageName};
use crate::pipeline::state::{IndexOutput, PipelineState};
use crate::vector_store::payload::tagged_metadata;
use crate::vector_store::{RecordKind, StoredRecord, compute_record_id};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;

const NAME: StageName = StageName::BuildIndex;

pub(super) const TAG_TITLE: &str = "title";
pub(super) const TAG_REFACTOR: &str = "refactor";
pub(super) const TAG_RAW_DATA: &str = "raw_data";
const TAG_SUMMARY: &str = "summary";
const TAG_PAGES: &str = "pages";
const TAG_HAS_TOC: &str = "has_toc";
const TAG_CHAPTER_COUNT: &str = "chapter_count";

/// Embeds chapter records into the per-document vector index.
pub struct BuildIndexStage;

#[async_trait]
impl Stage for BuildIndexStage {
    fn name(&self) -> StageName {
        NAME
    }

    /// Reusable only together with the chapter outputs it stores.
    async fn probe(&self, ctx: &PipelineContext, state: &mut PipelineState) -> Probe {
        if !state.is_skipped(StageName::ProcessChapters) {
            return Probe::Miss;
        }
        let index_path = ctx.layout.vector_dir(state.doc_name());
        if !ctx.vector_store.is_populated(&index_path).await {
            return Probe::Miss;
        }
        state.index = Some(IndexOutput {
            index_path: index_path.clone(),
            records: 0,
        });
        Probe::Hit {
            cached_files: vec![index_path],
        }
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        state: &mut PipelineState,
    ) -> Result<Vec<PathBuf>, StageError> {
        let drafts = draft_records(state)?;
        let contents: Vec<String> = drafts.iter().map(|(_, _, content, _)| content.clone()).collect();
        let vectors = ctx
            .bounded(NAME, StageErrorKind::Embedding, ctx.embedder.generate_embeddings(contents))
            .await?;
        if vectors.len() != drafts.len() {
            return Err(StageError::new(
                NAME,
                StageErrorKind::Embedding,
                format!("expected {} embeddings, received {}", drafts.len(), vectors.len()),
            ));
        }

        let records: Vec<StoredRecord> = drafts
            .into_iter()
            .zip(vectors)
            .map(|((kind, title, page_content, metadata), vector)| StoredRecord {
                id: compute_record_id(kind, &title, &page_content),
                page_content,
                metadata,
                vector,
            })
            .collect();

        let index_path = ctx.layout.vector_dir(state.doc_name());
        let stored = ctx
            .bounded(
                NAME,
                StageErrorKind::VectorStore,
                ctx.vector_store.build(&index_path, records),
            )
            .await?;
        tracing::info!(doc_name = %state.doc_name(), records = stored, "Vector index built");
        state.index = Some(IndexOutput {
            index_path: index_path.clone(),
            records: stored,
        });
        Ok(vec![index_path])
    }
}

type Draft = (RecordKind, String, String, Map<String, Value>);

/// Context and title records per chapter in reading order, then one structure record.
fn draft_records(state: &PipelineState) -> Result<Vec<Draft>, StageError> {
    let chapters = state
        .chapters
        .as_ref()
        .ok_or_else(|| StageError::missing_input(NAME, StageName::ProcessChapters))?;

    let mut chapter_pages: BTreeMap<String, Vec<u32>> = match (&state.chunks, &state.structure) {
        (Some(chunks), _) => chunks
            .chapters
            .iter()
            .map(|(title, chunk)| (title.clone(), chunk.pages.clone()))
            .collect(),
        (None, Some(structure)) => structure.agenda.clone(),
        (None, None) => BTreeMap::new(),
    };
    chapter_pages.retain(|title, _| chapters.summaries.contains_key(title));

    let mut drafts = Vec::new();
    for title in state.chapter_order() {
        let Some(summary) = chapters.summaries.get(&title) else {
            continue;
        };
        let pages = chapter_pages.get(&title).cloned().unwrap_or_default();

        let mut context = tagged_metadata(RecordKind::Context);
        context.insert(TAG_TITLE.into(), json!(title));
        context.insert(
            TAG_REFACTOR.into(),
            json!(chapters.refactors.get(&title).cloned().unwrap_or_default()),
        );
        context.insert(
            TAG_RAW_DATA.into(),
            json!(chapters.raw_data.get(&title).cloned().unwrap_or_default()),
        );
        context.insert(TAG_PAGES.into(), json!(pages));
        drafts.push((RecordKind::Context, title.clone(), summary.clone(), context));

        let mut heading = tagged_metadata(RecordKind::Title);
        heading.insert(TAG_TITLE.into(), json!(title));
        heading.insert(TAG_SUMMARY.into(), json!(summary));
        drafts.push((RecordKind::Title, title.clone(), title.clone(), heading));
    }

    let has_toc = state.structure.as_ref().is_some_and(|structure| structure.has_toc);
    let mut outline = tagged_metadata(RecordKind::Structure);
    outline.insert(TAG_HAS_TOC.into(), json!(has_toc));
    outline.insert(TAG_CHAPTER_COUNT.into(), json!(chapter_pages.len()));
    let rendered = serde_json::to_string(&chapter_pages)
        .map_err(|error| StageError::new(NAME, StageErrorKind::Serialization, error))?;
    drafts.push((
        RecordKind::Structure,
        state.doc_name().to_string(),
        rendered,
        outline,
    ));
    Ok(drafts)
}
