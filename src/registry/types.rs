//! Ledger records and report types for the document registry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Kind of source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    /// Page-scanned or born-digital PDF.
    Pdf,
    /// Remote web document.
    Url,
}

impl DocType {
    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Url => "url",
        }
    }
}

impl std::str::FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "url" => Ok(Self::Url),
            other => Err(format!("unsupported document type '{other}'")),
        }
    }
}

/// Status of one pipeline stage for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Not yet attempted.
    Pending,
    /// Finished, either by running or by finding a valid artifact.
    Completed,
    /// Raised an error on its last attempt.
    Failed,
}

/// Ledger entry for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEntry {
    /// Last recorded status.
    pub status: StageStatus,
    /// Artifacts the stage produced or found.
    #[serde(default)]
    pub output_files: Vec<PathBuf>,
    /// RFC3339 time of the last update.
    pub updated_at: String,
}

/// Lifecycle of a registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// The pipeline has started but `register` has not run yet.
    #[default]
    Processing,
    /// The document has been registered.
    Completed,
}

/// Artifacts generated for a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFiles {
    /// Rasterized page images.
    #[serde(default)]
    pub images: Vec<PathBuf>,
    /// Page-indexed extraction file.
    #[serde(default)]
    pub json_data: Option<PathBuf>,
    /// Vector index directory.
    #[serde(default)]
    pub vector_db: Option<PathBuf>,
    /// Rendered summaries.
    #[serde(default)]
    pub summaries: Vec<PathBuf>,
}

/// Durable per-document ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Generated identifier.
    pub doc_id: String,
    /// Natural key; `register` upserts on it.
    pub doc_name: String,
    /// Source location.
    pub doc_path: PathBuf,
    /// Source kind.
    pub doc_type: DocType,
    /// Vector index location, once built.
    #[serde(default)]
    pub index_path: Option<PathBuf>,
    /// Whole-document abstract.
    #[serde(default)]
    pub brief_summary: String,
    /// RFC3339 creation time; preserved across re-registration.
    pub created_at: String,
    /// RFC3339 time of the last successful registration.
    #[serde(default)]
    pub indexed_at: Option<String>,
    /// Record lifecycle.
    #[serde(default)]
    pub status: RecordStatus,
    /// Open metadata map.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Generated-file manifest.
    #[serde(default)]
    pub generated_files: GeneratedFiles,
    /// Stage name to ledger entry.
    #[serde(default)]
    pub processing_stages: BTreeMap<String, StageEntry>,
}

/// Arguments to [`crate::registry::DocumentRegistry::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    /// Natural key.
    pub doc_name: String,
    /// Source location.
    pub doc_path: PathBuf,
    /// Source kind.
    pub doc_type: DocType,
    /// Vector index location.
    pub index_path: Option<PathBuf>,
    /// Whole-document abstract.
    pub brief_summary: String,
    /// Metadata merged into the existing map.
    pub metadata: Map<String, Value>,
    /// Generated-file manifest; replaces the previous one.
    pub generated_files: GeneratedFiles,
}

/// Ordering for [`crate::registry::DocumentRegistry::list_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Most recently indexed first; unindexed records last.
    #[default]
    IndexedAt,
    /// Most recently created first.
    CreatedAt,
    /// Alphabetical by name.
    DocName,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "indexed_at" => Ok(Self::IndexedAt),
            "created_at" => Ok(Self::CreatedAt),
            "doc_name" => Ok(Self::DocName),
            other => Err(format!(
                "unknown sort key '{other}' (expected indexed_at, created_at, or doc_name)"
            )),
        }
    }
}

/// Outcome of [`crate::registry::DocumentRegistry::delete_all_files`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeletionReport {
    /// True when no category failed to delete.
    pub success: bool,
    /// Paths removed.
    pub deleted: Vec<PathBuf>,
    /// Recorded paths that were already gone.
    pub missing: Vec<PathBuf>,
    /// Paths whose removal failed.
    pub failed: Vec<PathBuf>,
    /// One message per failure, prefixed with its category.
    pub errors: Vec<String>,
}

/// Size summary for one artifact category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    /// Whether any recorded path exists.
    pub exists: bool,
    /// Number of files found.
    pub files: usize,
    /// Total bytes across those files.
    pub bytes: u64,
}

/// Artifact sizes for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileStats {
    /// Page images.
    pub images: CategoryStats,
    /// Per-document JSON artifacts.
    pub json_data: CategoryStats,
    /// Vector index.
    pub vector_db: CategoryStats,
    /// Rendered summaries.
    pub summaries: CategoryStats,
    /// Source document.
    pub source: CategoryStats,
    /// Sum of all categories.
    pub total_bytes: u64,
}

/// Aggregate counts across the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStatistics {
    /// Number of records.
    pub total_documents: usize,
    /// Records that finished registration.
    pub completed: usize,
    /// Record counts keyed by document type label.
    pub by_type: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_parses_known_values() {
        assert_eq!("created_at".parse::<SortKey>(), Ok(SortKey::CreatedAt));
        assert!("size".parse::<SortKey>().is_err());
    }

    #[test]
    fn record_tolerates_missing_optional_fields() {
        let json = r#"{
            "doc_id": "1",
            "doc_name": "manual",
            "doc_path": "manual.pdf",
            "doc_type": "pdf",
            "created_at": "2025-01-01T00:00:00Z"
        }"#;
        let record: DocumentRecord = serde_json::from_str(json).expect("record");
        assert_eq!(record.status, RecordStatus::Processing);
        assert!(record.processing_stages.is_empty());
        assert!(record.generated_files.images.is_empty());
    }
}
