//! Embedded record store backing the per-document similarity index.
//!
//! The pipeline never runs similarity queries itself. It needs two things from the store:
//! a bulk [`VectorStore::build`] for the index stage, and tag-filtered enumeration through
//! [`VectorStore::scan_by_tag`] so cached chapter outputs can be rebuilt from an existing
//! index. [`VectorStore::is_populated`] is the cache signal shared by the chapter and index
//! stages.

pub mod local;
pub mod payload;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use local::LocalVectorStore;
pub use payload::{RecordKind, compute_record_id};

/// Errors returned by vector store backends.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Filesystem access failed.
    #[error("Vector store I/O failed at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Stored index content could not be encoded or decoded.
    #[error("Vector store content at {path} is invalid: {source}")]
    Serialization {
        /// Path being decoded.
        path: PathBuf,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// Records disagree on vector dimensionality.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the first record.
        expected: usize,
        /// Dimension of the offending record.
        actual: usize,
    },
}

/// Record persisted in the store together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Deterministic identifier derived from kind, title, and content.
    pub id: String,
    /// Text the embedding was computed from.
    pub page_content: String,
    /// Tag fields; `type` carries the [`RecordKind`].
    pub metadata: Map<String, Value>,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

impl StoredRecord {
    /// String-valued metadata field, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Storage backend for embedded records.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace whatever lives at `path` with `records`. Returns the number of stored records.
    async fn build(&self, path: &Path, records: Vec<StoredRecord>) -> Result<usize, VectorStoreError>;

    /// Enumerate records whose `type` tag equals `kind`.
    async fn scan_by_tag(
        &self,
        path: &Path,
        kind: RecordKind,
    ) -> Result<Vec<StoredRecord>, VectorStoreError>;

    /// Whether `path` exists and holds at least one entry.
    async fn is_populated(&self, path: &Path) -> bool;
}
