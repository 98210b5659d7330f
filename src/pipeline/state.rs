//! Per-run document state threaded through the stages.

use super::artifacts::{ChapterChunk, PageRecord, StructureOutput};
use super::error::StageError;
use super::layout::ArtifactLayout;
use super::stage::StageName;
use crate::registry::{DocType, GeneratedFiles};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A document submitted for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInput {
    /// Natural key; also names every artifact.
    pub doc_name: String,
    /// Source location.
    pub doc_path: PathBuf,
    /// Source kind.
    pub doc_type: DocType,
}

impl DocumentInput {
    /// Describe a document explicitly.
    pub fn new(doc_name: impl Into<String>, doc_path: impl Into<PathBuf>, doc_type: DocType) -> Self {
        Self {
            doc_name: doc_name.into(),
            doc_path: doc_path.into(),
            doc_type,
        }
    }

    /// Derive the name and kind from a path or URL.
    ///
    /// The name is the file stem; `http(s)://` locations are URL documents.
    pub fn from_location(location: &str) -> Option<Self> {
        let doc_type = if location.starts_with("http://") || location.starts_with("https://") {
            DocType::Url
        } else {
            DocType::Pdf
        };
        let trimmed = location.trim_end_matches('/');
        let doc_name = Path::new(trimmed)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())?;
        Some(Self::new(doc_name, location, doc_type))
    }
}

/// Extraction output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutput {
    /// Pages in ascending order.
    pub pages: Vec<PageRecord>,
}

impl ParseOutput {
    /// Page number to text.
    pub fn page_texts(&self) -> BTreeMap<u32, String> {
        self.pages
            .iter()
            .map(|page| (page.page, page.content.clone()))
            .collect()
    }

    /// Rasterized images, in page order.
    pub fn images(&self) -> Vec<PathBuf> {
        self.pages.iter().filter_map(|page| page.image.clone()).collect()
    }
}

/// Chunking output: chapter title to its text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOutput {
    /// Chapter title to chunk.
    pub chapters: BTreeMap<String, ChapterChunk>,
}

/// Per-chapter processing output, keyed by chapter title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterOutputs {
    /// Chapter summaries.
    pub summaries: BTreeMap<String, String>,
    /// Rewritten chapter text.
    pub refactors: BTreeMap<String, String>,
    /// Raw chapter text.
    pub raw_data: BTreeMap<String, String>,
}

/// Index output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOutput {
    /// Vector index directory.
    pub index_path: PathBuf,
    /// Records stored; zero when the index was reused.
    pub records: usize,
}

/// Abstract output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryOutput {
    /// Rendered markdown, exactly as written to disk.
    pub brief_summary: String,
    /// Markdown file.
    pub path: PathBuf,
}

/// Cache decision for one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkipEntry {
    /// Whether the stage was satisfied from disk.
    pub skip: bool,
    /// Artifacts backing the skip.
    pub cached_files: Vec<PathBuf>,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Not started.
    #[default]
    Pending,
    /// Stages are executing.
    Running,
    /// Every stage finished.
    Completed,
    /// A stage failed and the run halted.
    Error,
}

/// Everything one pipeline run knows about its document.
#[derive(Debug, Clone)]
pub struct PipelineState {
    /// Submitted document.
    pub input: DocumentInput,
    /// Extracted pages.
    pub parse: Option<ParseOutput>,
    /// Chapter agenda.
    pub structure: Option<StructureOutput>,
    /// Chapter text.
    pub chunks: Option<ChunkOutput>,
    /// Chapter summaries and rewrites.
    pub chapters: Option<ChapterOutputs>,
    /// Vector index.
    pub index: Option<IndexOutput>,
    /// Document abstract.
    pub summary: Option<SummaryOutput>,
    /// Cache decision per cacheable stage.
    pub skip_table: BTreeMap<StageName, SkipEntry>,
    /// Registry identifier, set by `register`.
    pub doc_id: Option<String>,
    /// Run outcome.
    pub status: RunStatus,
    /// True once `register` has finished.
    pub is_complete: bool,
    /// Failure that halted the run.
    pub error: Option<StageError>,
    /// Stages that ran their work function, in order.
    pub executed: Vec<StageName>,
}

impl PipelineState {
    /// Fresh state for `input`.
    pub fn new(input: DocumentInput) -> Self {
        Self {
            input,
            parse: None,
            structure: None,
            chunks: None,
            chapters: None,
            index: None,
            summary: None,
            skip_table: BTreeMap::new(),
            doc_id: None,
            status: RunStatus::Pending,
            is_complete: false,
            error: None,
            executed: Vec::new(),
        }
    }

    /// Document name.
    pub fn doc_name(&self) -> &str {
        &self.input.doc_name
    }

    /// Whether the cache pass marked `stage` as skippable.
    pub fn is_skipped(&self, stage: StageName) -> bool {
        self.skip_table.get(&stage).is_some_and(|entry| entry.skip)
    }

    /// Page number to text, from the parse output.
    pub fn json_data_dict(&self) -> BTreeMap<u32, String> {
        self.parse.as_ref().map(ParseOutput::page_texts).unwrap_or_default()
    }

    /// Chapter titles ordered by first page, ties broken by title.
    ///
    /// Uses the chunk pages when known, then the agenda, then whatever chapter outputs exist.
    pub fn chapter_order(&self) -> Vec<String> {
        let mut keyed: Vec<(u32, String)> = if let Some(chunks) = &self.chunks {
            chunks
                .chapters
                .iter()
                .map(|(title, chunk)| (chunk.first_page().unwrap_or(u32::MAX), title.clone()))
                .collect()
        } else if let Some(structure) = &self.structure {
            structure
                .agenda
                .iter()
                .map(|(title, pages)| (pages.first().copied().unwrap_or(u32::MAX), title.clone()))
                .collect()
        } else if let Some(chapters) = &self.chapters {
            chapters
                .summaries
                .keys()
                .map(|title| (u32::MAX, title.clone()))
                .collect()
        } else {
            Vec::new()
        };
        keyed.sort();
        keyed.into_iter().map(|(_, title)| title).collect()
    }

    /// Manifest of the artifacts this run produced or reused.
    pub fn generated_files(&self, layout: &ArtifactLayout) -> GeneratedFiles {
        GeneratedFiles {
            images: self.parse.as_ref().map(ParseOutput::images).unwrap_or_default(),
            json_data: self.parse.as_ref().map(|_| layout.data_file(self.doc_name())),
            vector_db: self.index.as_ref().map(|index| index.index_path.clone()),
            summaries: self
                .summary
                .iter()
                .map(|summary| summary.path.clone())
                .collect(),
        }
    }

    pub(crate) fn fail(&mut self, error: StageError) {
        self.status = RunStatus::Error;
        self.is_complete = false;
        self.error = Some(error);
    }
}
