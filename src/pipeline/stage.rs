//! Stage vocabulary and the trait every pipeline step implements.

use super::context::PipelineContext;
use super::error::StageError;
use super::state::PipelineState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stable stage identifiers, in execution order.
///
/// The string forms are registry keys and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Rasterize pages and extract their content.
    Parse,
    /// Discover the chapter structure.
    ExtractStructure,
    /// Group page text by chapter.
    ChunkText,
    /// Summarize and rewrite each chapter.
    ProcessChapters,
    /// Embed chapter records into the vector store.
    BuildIndex,
    /// Produce the whole-document abstract.
    GenerateSummary,
    /// Upsert the registry record.
    Register,
}

impl StageName {
    /// Every stage in execution order.
    pub const ALL: [StageName; 7] = [
        Self::Parse,
        Self::ExtractStructure,
        Self::ChunkText,
        Self::ProcessChapters,
        Self::BuildIndex,
        Self::GenerateSummary,
        Self::Register,
    ];

    /// Registry key for the stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::ExtractStructure => "extract_structure",
            Self::ChunkText => "chunk_text",
            Self::ProcessChapters => "process_chapters",
            Self::BuildIndex => "build_index",
            Self::GenerateSummary => "generate_summary",
            Self::Register => "register",
        }
    }

    /// Whether the stage can be satisfied by an existing artifact.
    pub fn is_cacheable(self) -> bool {
        !matches!(self, Self::Register)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a cache probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The artifact exists, loaded cleanly, and has been rehydrated into the state.
    Hit {
        /// Artifacts backing the skip.
        cached_files: Vec<PathBuf>,
    },
    /// The stage must run.
    Miss,
}

/// One named, independently cacheable pipeline step.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage identifier.
    fn name(&self) -> StageName;

    /// Check for a reusable artifact and, on a hit, load it into `state`.
    ///
    /// Any problem reading the artifact is a miss, never an error.
    async fn probe(&self, _ctx: &PipelineContext, _state: &mut PipelineState) -> Probe {
        Probe::Miss
    }

    /// Do the stage's work and return the files it wrote.
    async fn run(
        &self,
        ctx: &PipelineContext,
        state: &mut PipelineState,
    ) -> Result<Vec<PathBuf>, StageError>;
}
