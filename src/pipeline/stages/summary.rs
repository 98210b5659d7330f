use crate::generation::{GenerationRequest, GenerationTask};
use crate::pipeline::artifacts;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::{StageError, StageErrorKind, StageResultExt};
use crate::pipeline::prompts;
use crate::pipeline::stage::{Probe, Stage, StageName};
use crate::pipeline::state::{PipelineState, SummaryOutput};
use async_trait::async_trait;
use std::path::PathBuf;

const NAME: StageName = StageName::GenerateSummary;

/// Writes the whole-document abstract.
pub struct GenerateSummaryStage;

#[async_trait]
impl Stage for GenerateSummaryStage {
    fn name(&self) -> StageName {
        NAME
    }

    async fn probe(&self, ctx: &PipelineContext, state: &mut PipelineState) -> Probe {
        let path = ctx.layout.summary_file(state.doc_name());
        match tokio::fs::read_to_string(&path).await {
            Ok(brief_summary) if !brief_summary.trim().is_empty() => {
                state.summary = Some(SummaryOutput {
                    brief_summary,
                    path: path.clone(),
                });
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
        let chapters = state
            .chapters
            .as_ref()
            .ok_or_else(|| StageError::missing_input(NAME, StageName::ProcessChapters))?;
        let ordered: Vec<(String, String)> = state
            .chapter_order()
            .into_iter()
            .filter_map(|title| {
                let summary = chapters.summaries.get(&title)?.clone();
                Some((title, summary))
            })
            .collect();
        if ordered.is_empty() {
            return Err(StageError::new(
                NAME,
                StageErrorKind::InvalidInput,
                "no chapter summaries to condense",
            ));
        }
        let borrowed: Vec<(&str, &str)> = ordered
            .iter()
            .map(|(title, summary)| (title.as_str(), summary.as_str()))
            .collect();

        let doc_name = state.doc_name().to_string();
        let request = GenerationRequest::text(
            GenerationTask::DocumentAbstract,
            prompts::document_abstract(&doc_name, &borrowed),
        );
        let abstract_text = ctx.generate(NAME, request).await?;
        let brief_summary = render_markdown(&doc_name, &abstract_text);

        let path = ctx.layout.summary_file(&doc_name);
        artifacts::write_bytes(&path, brief_summary.as_bytes())
            .await
            .stage_err(NAME, StageErrorKind::Io)?;
        state.summary = Some(SummaryOutput {
            brief_summary,
            path: path.clone(),
        });
        Ok(vec![path])
    }
}

fn render_markdown(doc_name: &str, abstract_text: &str) -> String {
    format!("# {doc_name}\n\n{}\n", abstract_text.trim())
}
