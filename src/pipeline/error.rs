//! Tagged stage failures.

use super::stage::StageName;
use std::fmt;
use thiserror::Error;

/// Category of a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageErrorKind {
    /// Page rasterization failed.
    Rasterize,
    /// The generation service failed.
    Generation,
    /// The embedding service failed.
    Embedding,
    /// The vector store failed.
    VectorStore,
    /// Reading or writing an artifact failed.
    Io,
    /// An artifact could not be encoded.
    Serialization,
    /// The registry could not be updated.
    Registry,
    /// The document kind is not supported by the stage.
    Unsupported,
    /// An external call exceeded its deadline.
    Timeout,
    /// Upstream data was missing or unusable.
    InvalidInput,
}

impl fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Rasterize => "rasterize",
            Self::Generation => "generation",
            Self::Embedding => "embedding",
            Self::VectorStore => "vector_store",
            Self::Io => "io",
            Self::Serialization => "serialization",
            Self::Registry => "registry",
            Self::Unsupported => "unsupported",
            Self::Timeout => "timeout",
            Self::InvalidInput => "invalid_input",
        };
        f.write_str(label)
    }
}

/// Failure of one named stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stage {stage} failed ({kind}): {message}")]
pub struct StageError {
    /// Stage that failed.
    pub stage: StageName,
    /// Failure category.
    pub kind: StageErrorKind,
    /// Human-readable cause.
    pub message: String,
}

impl StageError {
    /// Build a stage error from any displayable cause.
    pub fn new(stage: StageName, kind: StageErrorKind, message: impl fmt::Display) -> Self {
        Self {
            stage,
            kind,
            message: message.to_string(),
        }
    }

    /// Error for a stage that ran without the output of an earlier stage.
    pub fn missing_input(stage: StageName, upstream: StageName) -> Self {
        Self::new(
            stage,
            StageErrorKind::InvalidInput,
            format!("output of {upstream} is not available"),
        )
    }
}

/// Attach stage context to foreign errors.
pub(crate) trait StageResultExt<T> {
    fn stage_err(self, stage: StageName, kind: StageErrorKind) -> Result<T, StageError>;
}

impl<T, E: fmt::Display> StageResultExt<T> for Result<T, E> {
    fn stage_err(self, stage: StageName, kind: StageErrorKind) -> Result<T, StageError> {
        self.map_err(|error| StageError::new(stage, kind, error))
    }
}
