use crate::generation::{GenerationRequest, GenerationTask};
use crate::pipeline::artifacts::{self, Agenda, StructureOutput};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::{StageError, StageErrorKind, StageResultExt};
use crate::pipeline::prompts::{self, ChapterCandidate};
use crate::pipeline::stage::{Probe, Stage, StageName};
use crate::pipeline::state::PipelineState;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tokio::sync::Semaphore;

const NAME: StageName = StageName::ExtractStructure;

/// Discovers chapters from a table of contents, falling back to batched heading detection.
pub struct ExtractStructureStage;

#[async_trait]
impl Stage for ExtractStructureStage {
    fn name(&self) -> StageName {
        NAME
    }

    async fn probe(&self, ctx: &PipelineContext, state: &mut PipelineState) -> Probe {
        let path = ctx.layout.structure_file(state.doc_name());
        match artifacts::read_structure(&path).await {
            Some(structure) if !structure.agenda.is_empty() => {
                state.structure = Some(structure);
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
        let pages = state.json_data_dict();
        if pages.is_empty() {
            return Err(StageError::missing_input(NAME, StageName::Parse));
        }
        let page_numbers: Vec<u32> = pages.keys().copied().collect();
        let doc_name = state.doc_name().to_string();

        let toc = mine_toc(ctx, &pages).await?;
        let structure = if toc.is_empty() {
            tracing::info!(doc_name = %doc_name, "No table of contents found; detecting chapters");
            let candidates = detect_chapters(ctx, &pages).await?;
            StructureOutput {
                agenda: build_agenda(candidates, &page_numbers, &doc_name),
                has_toc: false,
            }
        } else {
            StructureOutput {
                agenda: build_agenda(toc, &page_numbers, &doc_name),
                has_toc: true,
            }
        };
        tracing::info!(
            doc_name = %doc_name,
            chapters = structure.agenda.len(),
            has_toc = structure.has_toc,
            "Structure extracted"
        );

        let path = ctx.layout.structure_file(&doc_name);
        artifacts::write_json(&path, &structure)
            .await
            .stage_err(NAME, StageErrorKind::Io)?;
        state.structure = Some(structure);
        Ok(vec![path])
    }
}

/// Ask for a table of contents over the leading pages; an empty result means none was found.
async fn mine_toc(
    ctx: &PipelineContext,
    pages: &BTreeMap<u32, String>,
) -> Result<Vec<ChapterCandidate>, StageError> {
    let leading: Vec<(u32, &str)> = pages
        .iter()
        .take(ctx.settings.toc_page_limit.max(1))
        .map(|(page, text)| (*page, text.as_str()))
        .collect();
    let request = GenerationRequest::text(GenerationTask::TocMining, prompts::toc_mining(&leading));
    let reply = ctx.generate(NAME, request).await?;
    Ok(usable(prompts::parse_candidates(&reply), pages))
}

/// Detect chapter starts batch by batch and merge every batch's candidates.
async fn detect_chapters(
    ctx: &PipelineContext,
    pages: &BTreeMap<u32, String>,
) -> Result<Vec<ChapterCandidate>, StageError> {
    let ordered: Vec<(u32, &str)> = pages.iter().map(|(page, text)| (*page, text.as_str())).collect();
    let semaphore = Semaphore::new(ctx.settings.page_concurrency.max(1));
    let batches = ordered
        .chunks(ctx.settings.structure_batch_size.max(1))
        .map(|batch| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .stage_err(NAME, StageErrorKind::Generation)?;
                let request = GenerationRequest::text(
                    GenerationTask::ChapterDetection,
                    prompts::chapter_detection(batch),
                );
                let reply = ctx.generate(NAME, request).await?;
                Ok::<_, StageError>(prompts::parse_candidates(&reply))
            }
        });
    let merged = try_join_all(batches).await?.into_iter().flatten().collect();
    Ok(usable(merged, pages))
}

fn usable(candidates: Vec<ChapterCandidate>, pages: &BTreeMap<u32, String>) -> Vec<ChapterCandidate> {
    let last_page = pages.keys().next_back().copied().unwrap_or(0);
    candidates
        .into_iter()
        .filter(|candidate| !candidate.title.trim().is_empty() && candidate.start_page <= last_page)
        .collect()
}

/// Turn chapter start candidates into page ranges over the pages that actually exist.
///
/// Titles are trimmed and de-duplicated keeping the earliest start. A start that falls on a
/// missing page snaps forward to the next existing page; starts past the last page are
/// dropped, as is any later candidate sharing a start page. Pages before the first chapter
/// belong to it. Without any usable candidate the whole document is one chapter named
/// `fallback_title`.
pub fn build_agenda(candidates: Vec<ChapterCandidate>, pages: &[u32], fallback_title: &str) -> Agenda {
    let pages: BTreeSet<u32> = pages.iter().copied().collect();
    let Some(&first_page) = pages.first() else {
        return Agenda::new();
    };

    let mut earliest: BTreeMap<String, u32> = BTreeMap::new();
    for candidate in candidates {
        let title = candidate.title.trim();
        let Some(&start) = pages.range(candidate.start_page..).next() else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        earliest
            .entry(title.to_string())
            .and_modify(|existing| *existing = (*existing).min(start))
            .or_insert(start);
    }

    let mut starts: Vec<(u32, String)> = earliest.into_iter().map(|(title, start)| (start, title)).collect();
    starts.sort();
    starts.dedup_by_key(|(start, _)| *start);

    if starts.is_empty() {
        return Agenda::from([(fallback_title.to_string(), pages.into_iter().collect())]);
    }

    let mut agenda = Agenda::new();
    for (idx, (start, title)) in starts.iter().enumerate() {
        let from = if idx == 0 { first_page } else { *start };
        let span: Vec<u32> = match starts.get(idx + 1) {
            Some((next, _)) => pages.range(from..*next).copied().collect(),
            None => pages.range(from..).copied().collect(),
        };
        agenda.insert(title.clone(), span);
    }
    agenda
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, start_page: u32) -> ChapterCandidate {
        ChapterCandidate {
            title: title.into(),
            start_page,
        }
    }

    #[test]
    fn splits_pages_at_chapter_starts() {
        let agenda = build_agenda(
            vec![candidate("Methods", 3), candidate("Intro", 1), candidate("Results", 5)],
            &[1, 2, 3, 4, 5, 6],
            "doc",
        );
        assert_eq!(agenda["Intro"], vec![1, 2]);
        assert_eq!(agenda["Methods"], vec![3, 4]);
        assert_eq!(agenda["Results"], vec![5, 6]);
    }

    #[test]
    fn merges_duplicates_and_drops_out_of_range_starts() {
        let agenda = build_agenda(
            vec![
                candidate(" Intro ", 2),
                candidate("Intro", 5),
                candidate("Body", 4),
                candidate("Index", 40),
                candidate("", 3),
            ],
            &[1, 2, 3, 4, 5],
            "doc",
        );
        assert_eq!(agenda.len(), 2);
        assert_eq!(agenda["Intro"], vec![1, 2, 3]);
        assert_eq!(agenda["Body"], vec![4, 5]);
    }

    #[test]
    fn snaps_starts_onto_existing_pages() {
        let agenda = build_agenda(
            vec![candidate("Intro", 1), candidate("Body", 3)],
            &[1, 2, 4, 5],
            "doc",
        );
        assert_eq!(agenda["Body"], vec![4, 5]);
    }

    #[test]
    fn falls_back_to_a_single_chapter() {
        let agenda = build_agenda(Vec::new(), &[1, 2, 3], "handbook");
        assert_eq!(agenda, Agenda::from([("handbook".to_string(), vec![1, 2, 3])]));
        assert!(build_agenda(Vec::new(), &[], "handbook").is_empty());
    }
}
