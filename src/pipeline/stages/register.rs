use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::{StageError, StageErrorKind, StageResultExt};
use crate::pipeline::stage::{Stage, StageName};
use crate::pipeline::state::{PipelineState, RunStatus};
use crate::registry::Registration;
use async_trait::async_trait;
use serde_json::{Map, json};
use std::path::PathBuf;

const NAME: StageName = StageName::Register;

/// Upserts the document into the registry. Always runs.
pub struct RegisterStage;

#[async_trait]
impl Stage for RegisterStage {
    fn name(&self) -> StageName {
        NAME
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        state: &mut PipelineState,
    ) -> Result<Vec<PathBuf>, StageError> {
        let generated_files = state.generated_files(&ctx.layout);
        let mut metadata = Map::new();
        if let Some(parse) = &state.parse {
            metadata.insert("page_count".into(), json!(parse.pages.len()));
        }
        if let Some(structure) = &state.structure {
            metadata.insert("has_toc".into(), json!(structure.has_toc));
            metadata.insert("chapter_count".into(), json!(structure.agenda.len()));
        }
        if let Some(index) = &state.index
            && index.records > 0
        {
            metadata.insert("index_records".into(), json!(index.records));
        }

        let registration = Registration {
            doc_name: state.input.doc_name.clone(),
            doc_path: state.input.doc_path.clone(),
            doc_type: state.input.doc_type,
            index_path: state.index.as_ref().map(|index| index.index_path.clone()),
            brief_summary: state
                .summary
                .as_ref()
                .map(|summary| summary.brief_summary.clone())
                .unwrap_or_default(),
            metadata,
            generated_files,
        };
        let doc_id = ctx
            .registry
            .register(registration)
            .stage_err(NAME, StageErrorKind::Registry)?;

        state.doc_id = Some(doc_id);
        state.status = RunStatus::Completed;
        state.is_complete = true;
        Ok(vec![ctx.registry.snapshot_path()])
    }
}
