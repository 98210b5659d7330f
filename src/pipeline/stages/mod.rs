//! The seven document stages, in execution order.

mod chapters;
mod chunk;
mod index;
mod parse;
mod register;
mod structure;
mod summary;

pub use chapters::ProcessChaptersStage;
pub use chunk::ChunkTextStage;
pub use index::BuildIndexStage;
pub use parse::ParseStage;
pub use register::RegisterStage;
pub use structure::{ExtractStructureStage, build_agenda};
pub use summary::GenerateSummaryStage;

use super::stage::Stage;

/// The standard stage list.
pub fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(ParseStage),
        Box::new(ExtractStructureStage),
        Box::new(ChunkTextStage),
        Box::new(ProcessChaptersStage),
        Box::new(BuildIndexStage),
        Box::new(GenerateSummaryStage),
        Box::new(RegisterStage),
    ]
}
