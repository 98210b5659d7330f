//! Checkpointed document indexing pipeline.
//!
//! A document moves through seven stages: parse, extract_structure, chunk_text,
//! process_chapters, build_index, generate_summary, and register. Every stage except
//! `register` persists an artifact under the data root, and a later run reuses any artifact
//! that loads cleanly instead of redoing the work. Deleting an artifact forces only the
//! stages that depend on it to run again.

pub mod artifacts;
pub mod batch;
pub mod context;
pub mod error;
pub mod layout;
pub mod orchestrator;
mod prompts;
pub mod stage;
pub mod stages;
pub mod state;

pub use artifacts::{Agenda, ChapterChunk, PageRecord, StructureOutput};
pub use batch::{BatchController, BatchReport, DocumentOutcome};
pub use context::{PipelineContext, PipelineSettings};
pub use error::{StageError, StageErrorKind};
pub use layout::ArtifactLayout;
pub use orchestrator::DocumentPipeline;
pub use prompts::ChapterCandidate;
pub use stage::{Probe, Stage, StageName};
pub use state::{
    ChapterOutputs, ChunkOutput, DocumentInput, IndexOutput, ParseOutput, PipelineState,
    RunStatus, SkipEntry, SummaryOutput,
};
